use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::home))
        .route("/home", get(handlers::home))
        .route("/data", get(handlers::data_overview))
        .route("/upload", get(handlers::upload_page).post(handlers::upload))
        .route("/image/:id/delete", post(handlers::delete_image))
        .route(
            "/image/:id/rename",
            get(handlers::rename_page).post(handlers::rename_image),
        )
        .route("/image/:id/download", get(handlers::download_image))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod session;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/delete_account", post(handlers::delete_account))
}

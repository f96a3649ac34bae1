use std::path::Path as FsPath;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument, warn};

use crate::{
    auth::{repo::User, session::CurrentUser},
    error::AppError,
    images::dto::{ImageListItem, OverviewResponse, RenameRequest, UploadInfo},
    images::repo::Image,
    state::AppState,
    storage::sanitize_file_name,
};

/// Only image uploads are accepted, by extension, before anything is written.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

fn has_allowed_extension(file_name: &str) -> bool {
    FsPath::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn content_type_for(file_name: &str) -> &'static str {
    match FsPath::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Load an image and enforce that the caller owns it. Every image-scoped
/// operation goes through this check first.
async fn owned_image(state: &AppState, image_id: i64, user_id: i64) -> Result<Image, AppError> {
    let image = Image::find_by_id(&state.db, image_id)
        .await?
        .ok_or(AppError::NotFound("image"))?;
    if image.user_id != user_id {
        warn!(image_id, owner = image.user_id, caller = user_id, "ownership check failed");
        return Err(AppError::Forbidden);
    }
    Ok(image)
}

#[instrument(skip(state))]
pub async fn home(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ImageListItem>>, AppError> {
    let images = Image::list_by_user(&state.db, user_id).await?;
    Ok(Json(images.into_iter().map(ImageListItem::from).collect()))
}

#[instrument]
pub async fn upload_page(CurrentUser(_user_id): CurrentUser) -> Json<UploadInfo> {
    Json(UploadInfo {
        field: "file",
        allowed_extensions: ALLOWED_EXTENSIONS,
    })
}

/// Multipart upload, single `file` field. The file is written to the user's
/// storage root first and the row recorded after; a crash in between leaves
/// an orphan file rather than a row with no backing file.
#[instrument(skip(state, multipart))]
pub async fn upload(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let mut upload: Option<(String, bytes::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Validation("file name is required".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        upload = Some((file_name, data));
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::Validation("file field is required".into()))?;

    if !has_allowed_extension(&file_name) {
        warn!(file_name = %file_name, "upload with disallowed extension rejected");
        return Err(AppError::Validation(format!(
            "Only {} files are allowed",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if data.is_empty() {
        return Err(AppError::Validation("file payload is empty".into()));
    }

    let stored = state.storage.store(user_id, &file_name, data).await?;
    let image = Image::create(
        &state.db,
        &stored.name,
        &stored.path.to_string_lossy(),
        user_id,
    )
    .await?;
    info!(user_id, image_id = image.id, file_name = %image.file_name, "image uploaded");

    Ok(Redirect::to("/home"))
}

#[instrument(skip(state))]
pub async fn rename_page(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Json<ImageListItem>, AppError> {
    let image = owned_image(&state, image_id, user_id).await?;
    Ok(Json(ImageListItem::from(image)))
}

/// Rename keeps the stored file's extension no matter what the requested
/// name looks like; the filesystem moves first, then the record follows.
/// There is no compensation if the second step fails.
#[instrument(skip(state, payload))]
pub async fn rename_image(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
    Json(payload): Json<RenameRequest>,
) -> Result<Redirect, AppError> {
    let image = owned_image(&state, image_id, user_id).await?;

    let new_base = sanitize_file_name(payload.new_name.trim())
        .map_err(|_| AppError::Validation("Invalid file name".into()))?;
    let extension = FsPath::new(&image.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let new_file_name = format!("{new_base}{extension}");
    let new_path = state.storage.user_root(user_id).join(&new_file_name);

    state
        .storage
        .rename(FsPath::new(&image.file_path), &new_path)
        .await?;
    Image::update_name(
        &state.db,
        image.id,
        &new_file_name,
        &new_path.to_string_lossy(),
    )
    .await?;
    info!(user_id, image_id, new_file_name = %new_file_name, "image renamed");

    Ok(Redirect::to("/home"))
}

#[instrument(skip(state))]
pub async fn download_image(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Response, AppError> {
    let image = owned_image(&state, image_id, user_id).await?;

    let file = state
        .storage
        .read_stream(FsPath::new(&image.file_path))
        .await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let headers = [
        (header::CONTENT_TYPE, content_type_for(&image.file_name).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", image.file_name),
        ),
    ];
    Ok((headers, body).into_response())
}

/// File removal is best-effort; a missing file must not keep the row alive.
#[instrument(skip(state))]
pub async fn delete_image(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Redirect, AppError> {
    let image = owned_image(&state, image_id, user_id).await?;

    if let Err(e) = state.storage.delete(FsPath::new(&image.file_path)).await {
        warn!(error = %e, image_id, path = %image.file_path, "could not remove file, continuing");
    }
    Image::delete(&state.db, image.id).await?;
    info!(user_id, image_id, "image deleted");

    Ok(Redirect::to("/home"))
}

#[instrument(skip(state))]
pub async fn data_overview(
    CurrentUser(_user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<OverviewResponse>, AppError> {
    let users = User::list_all(&state.db).await?;
    let images = Image::list_all(&state.db).await?;
    Ok(Json(OverviewResponse {
        users: users.into_iter().map(Into::into).collect(),
        images: images.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list() {
        assert!(has_allowed_extension("photo.jpg"));
        assert!(has_allowed_extension("photo.JPEG"));
        assert!(has_allowed_extension("photo.png"));
        assert!(!has_allowed_extension("animation.gif"));
        assert!(!has_allowed_extension("script.sh"));
        assert!(!has_allowed_extension("no_extension"));
    }

    #[test]
    fn content_types_follow_the_stored_extension() {
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}

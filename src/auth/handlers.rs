use std::path::Path;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, NextQuery, RegisterRequest},
        password::{hash_password, verify_password},
        repo::User,
        session::{CurrentUser, Session},
    },
    error::AppError,
    images::repo::Image,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

const MIN_PASSWORD_LEN: usize = 8;

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .build()
}

fn removal_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), ""))
        .path("/")
        .build()
}

/// Registration is anonymous-only; a logged-in caller is sent home.
#[instrument]
pub async fn register_page(user: Option<CurrentUser>) -> Response {
    if user.is_some() {
        return Redirect::to("/home").into_response();
    }
    Json(json!({ "fields": ["email", "password"] })).into_response()
}

#[instrument(skip(state, payload))]
pub async fn register(
    user: Option<CurrentUser>,
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    if user.is_some() {
        return Ok(Redirect::to("/home").into_response());
    }
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::EmailTaken);
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::Internal(e)
    })?;

    let user = User::create(&state.db, &payload.email, &hash).await?;
    info!(user_id = user.id, email = %user.email, "user registered");

    Ok(Redirect::to("/login").into_response())
}

/// Login is anonymous-only; a logged-in caller is sent home.
#[instrument]
pub async fn login_page(user: Option<CurrentUser>) -> Response {
    if user.is_some() {
        return Redirect::to("/home").into_response();
    }
    Json(json!({ "fields": ["email", "password"] })).into_response()
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    user: Option<CurrentUser>,
    State(state): State<AppState>,
    Query(next): Query<NextQuery>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if user.is_some() {
        return Ok(Redirect::to("/home").into_response());
    }
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    // One generic failure for unknown email and wrong password alike.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };
    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        AppError::Internal(e)
    })?;
    if !ok {
        warn!(email = %payload.email, user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let session = Session::create(&state.db, user.id, state.config.session.ttl_minutes)
        .await
        .map_err(AppError::Internal)?;
    info!(user_id = user.id, email = %user.email, "user logged in");

    // Only absolute paths are honored as post-login targets.
    let target = match next.next.as_deref() {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/home".to_string(),
    };

    let jar = jar.add(session_cookie(&state, session.token));
    Ok((jar, Redirect::to(&target)).into_response())
}

#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    if let Some(cookie) = jar.get(&state.config.session.cookie_name) {
        Session::delete(&state.db, cookie.value())
            .await
            .map_err(AppError::Internal)?;
    }
    let jar = jar.remove(removal_cookie(&state));
    Ok((jar, Redirect::to("/home")).into_response())
}

/// Remove the account, every owned image (file removal is best-effort, row
/// removal is not), and every session belonging to it.
#[instrument(skip(state, jar))]
pub async fn delete_account(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let images = Image::list_by_user(&state.db, user_id)
        .await
        .map_err(AppError::Internal)?;

    for image in images {
        if let Err(e) = state.storage.delete(Path::new(&image.file_path)).await {
            warn!(error = %e, image_id = image.id, path = %image.file_path, "could not remove file, continuing");
        }
        Image::delete(&state.db, image.id)
            .await
            .map_err(AppError::Internal)?;
    }

    User::delete(&state.db, user.id)
        .await
        .map_err(AppError::Internal)?;
    Session::delete_for_user(&state.db, user.id)
        .await
        .map_err(AppError::Internal)?;
    info!(user_id, email = %user.email, "account and owned images deleted");

    let jar = jar.remove(removal_cookie(&state));
    Ok((jar, Redirect::to("/home")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("spaces in@name.com"));
        assert!(!is_valid_email("missing@tld"));
    }
}

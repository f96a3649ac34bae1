use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use sqlx::{FromRow, SqlitePool};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

/// Server-side session record. The token is the opaque value carried in the
/// session cookie; a row is the sole proof of an authenticated session, so
/// deleting it is a full logout.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub async fn create(db: &SqlitePool, user_id: i64, ttl_minutes: i64) -> anyhow::Result<Session> {
        let now = OffsetDateTime::now_utc();
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            RETURNING token, user_id, created_at, expires_at
            "#,
        )
        .bind(Uuid::new_v4().simple().to_string())
        .bind(user_id)
        .bind(now)
        .bind(now + Duration::minutes(ttl_minutes))
        .fetch_one(db)
        .await?;
        debug!(user_id, "session created");
        Ok(session)
    }

    /// Resolve a token to its user id. Expired tokens resolve to nothing.
    pub async fn find_user_id(db: &SqlitePool, token: &str) -> anyhow::Result<Option<i64>> {
        let row: Option<(i64, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT user_id, expires_at FROM sessions
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row
            .filter(|(_, expires_at)| *expires_at > OffsetDateTime::now_utc())
            .map(|(id, _)| id))
    }

    pub async fn delete(db: &SqlitePool, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete_for_user(db: &SqlitePool, user_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }
}

/// Redirect an anonymous caller to the login entry point, preserving the
/// originally requested path for the post-login redirect.
pub struct LoginRedirect {
    next: String,
}

impl LoginRedirect {
    fn for_path(path: &str) -> Self {
        Self {
            next: path.to_string(),
        }
    }
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&format!("/login?next={}", self.next)).into_response()
    }
}

/// Authenticated session identity for the current request. Handlers that
/// require authentication take this extractor; anonymous callers get the
/// login redirect instead.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = LoginRedirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let reject = || LoginRedirect::for_path(parts.uri.path());

        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.session.cookie_name)
            .map(|c| c.value().to_string())
            .ok_or_else(reject)?;

        match Session::find_user_id(&state.db, &token).await {
            Ok(Some(user_id)) => Ok(CurrentUser(user_id)),
            Ok(None) => {
                debug!("unknown or expired session token");
                Err(reject())
            }
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed");
                Err(reject())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    async fn seed_user(db: &SqlitePool) -> i64 {
        crate::auth::repo::User::create(db, "a@x.com", "hash")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_and_resolve_session() {
        let (state, _dir) = test_state().await;
        let user_id = seed_user(&state.db).await;
        let session = Session::create(&state.db, user_id, 60).await.unwrap();

        let resolved = Session::find_user_id(&state.db, &session.token)
            .await
            .unwrap();
        assert_eq!(resolved, Some(user_id));
        assert!(Session::find_user_id(&state.db, "bogus-token")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_anonymous() {
        let (state, _dir) = test_state().await;
        let user_id = seed_user(&state.db).await;
        let session = Session::create(&state.db, user_id, -1).await.unwrap();

        assert!(Session::find_user_id(&state.db, &session.token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_invalidates_the_token() {
        let (state, _dir) = test_state().await;
        let user_id = seed_user(&state.db).await;
        let session = Session::create(&state.db, user_id, 60).await.unwrap();

        Session::delete(&state.db, &session.token).await.unwrap();
        assert!(Session::find_user_id(&state.db, &session.token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_for_user_clears_every_session() {
        let (state, _dir) = test_state().await;
        let user_id = seed_user(&state.db).await;
        let a = Session::create(&state.db, user_id, 60).await.unwrap();
        let b = Session::create(&state.db, user_id, 60).await.unwrap();
        assert_ne!(a.token, b.token);

        Session::delete_for_user(&state.db, user_id).await.unwrap();
        assert!(Session::find_user_id(&state.db, &a.token)
            .await
            .unwrap()
            .is_none());
        assert!(Session::find_user_id(&state.db, &b.token)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn login_redirect_preserves_the_destination() {
        let response = LoginRedirect::for_path("/upload").into_response();
        assert_eq!(
            response.headers().get(axum::http::header::LOCATION).unwrap(),
            "/login?next=/upload"
        );
    }
}

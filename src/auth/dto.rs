use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Post-login redirect target carried through the login gate.
#[derive(Debug, Deserialize, Default)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Public part of a user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub active: bool,
}

impl From<crate::auth::repo::User> for PublicUser {
    fn from(u: crate::auth::repo::User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            created_at: u.created_at,
            active: u.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_serializes_without_secrets() {
        let user = crate::auth::repo::User {
            id: 3,
            email: "test@example.com".into(),
            password_hash: "phc-string".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            active: true,
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("phc-string"));
    }
}

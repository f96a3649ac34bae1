use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub active: bool,
}

impl User {
    pub async fn find_by_email(db: &SqlitePool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at, active
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at, active
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with a hashed password. New accounts start active.
    pub async fn create(db: &SqlitePool, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, created_at, active)
            VALUES (?, ?, ?, 1)
            RETURNING id, email, password_hash, created_at, active
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn delete(db: &SqlitePool, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn list_all(db: &SqlitePool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at, active
            FROM users
            ORDER BY id ASC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn create_and_find_by_email() {
        let (state, _dir) = test_state().await;
        let user = User::create(&state.db, "a@x.com", "hash").await.unwrap();
        assert!(user.active);

        let found = User::find_by_email(&state.db, "a@x.com")
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(found.id, user.id);
        assert!(User::find_by_email(&state.db, "b@y.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_email_violates_unique_constraint() {
        let (state, _dir) = test_state().await;
        User::create(&state.db, "a@x.com", "hash").await.unwrap();
        assert!(User::create(&state.db, "a@x.com", "hash2").await.is_err());

        let users = User::list_all(&state.db).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let (state, _dir) = test_state().await;
        let user = User::create(&state.db, "a@x.com", "hash").await.unwrap();
        User::delete(&state.db, user.id).await.unwrap();
        assert!(User::find_by_id(&state.db, user.id)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: 1,
            email: "a@x.com".into(),
            password_hash: "super-secret-hash".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            active: true,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("super-secret-hash"));
        assert!(json.contains("a@x.com"));
    }
}

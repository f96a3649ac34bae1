use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

/// Image record. `file_name` is the server-generated stored name, never the
/// client's original; `file_path` mirrors the location on disk.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub upload_date: OffsetDateTime,
    pub user_id: i64,
    pub active: bool,
}

impl Image {
    pub async fn create(
        db: &SqlitePool,
        file_name: &str,
        file_path: &str,
        user_id: i64,
    ) -> anyhow::Result<Image> {
        let image = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO images (file_name, file_path, upload_date, user_id, active)
            VALUES (?, ?, ?, ?, 1)
            RETURNING id, file_name, file_path, upload_date, user_id, active
            "#,
        )
        .bind(file_name)
        .bind(file_path)
        .bind(OffsetDateTime::now_utc())
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(image)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> anyhow::Result<Option<Image>> {
        let image = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, file_name, file_path, upload_date, user_id, active
            FROM images
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(image)
    }

    pub async fn list_by_user(db: &SqlitePool, user_id: i64) -> anyhow::Result<Vec<Image>> {
        let rows = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, file_name, file_path, upload_date, user_id, active
            FROM images
            WHERE user_id = ?
            ORDER BY upload_date DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Point the record at its renamed file. The filesystem rename happens
    /// first; this is the second half of the two-step mutation.
    pub async fn update_name(
        db: &SqlitePool,
        id: i64,
        file_name: &str,
        file_path: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE images SET file_name = ?, file_path = ? WHERE id = ?")
            .bind(file_name)
            .bind(file_path)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete(db: &SqlitePool, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn list_all(db: &SqlitePool) -> anyhow::Result<Vec<Image>> {
        let rows = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, file_name, file_path, upload_date, user_id, active
            FROM images
            ORDER BY id ASC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

use std::sync::Arc;

use anyhow::Context;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::config::AppConfig;
use crate::storage::{LocalStorage, StorageBackend};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageBackend>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage =
            Arc::new(LocalStorage::new(config.upload_dir.clone())) as Arc<dyn StorageBackend>;

        Ok(Self::from_parts(db, config, storage))
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            db,
            config,
            storage,
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::config::SessionConfig;

    /// In-memory database plus tempdir-backed storage for tests. The tempdir
    /// guard must stay alive for the duration of the test.
    pub async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("migrations");

        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            upload_dir: dir.path().to_path_buf(),
            session: SessionConfig {
                cookie_name: "picstash_session".into(),
                ttl_minutes: 60,
            },
        });
        let storage = Arc::new(LocalStorage::new(dir.path())) as Arc<dyn StorageBackend>;

        (AppState::from_parts(db, config, storage), dir)
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("destination already exists: {0}")]
    NameConflict(PathBuf),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name and absolute path a stored file ended up under.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Directory owned by a single user. Created on first write.
    fn user_root(&self, user_id: i64) -> PathBuf;

    /// Write `body` under a freshly generated stored name in the user's root.
    async fn store(
        &self,
        user_id: i64,
        original_name: &str,
        body: Bytes,
    ) -> Result<StoredFile, StorageError>;

    /// Rename a stored file. Never overwrites: an existing destination is a
    /// `NameConflict`.
    async fn rename(&self, old_path: &Path, new_path: &Path) -> Result<(), StorageError>;

    async fn delete(&self, path: &Path) -> Result<(), StorageError>;

    /// Open a stored file for a streaming download response.
    async fn read_stream(&self, path: &Path) -> Result<fs::File, StorageError>;
}

/// Filesystem storage rooted at the configured upload directory, one
/// subdirectory per user id. Holds no metadata; the handlers own the
/// consistency contract with the database.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn user_root(&self, user_id: i64) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    async fn store(
        &self,
        user_id: i64,
        original_name: &str,
        body: Bytes,
    ) -> Result<StoredFile, StorageError> {
        let safe_name = sanitize_file_name(original_name)?;
        let root = self.user_root(user_id);
        fs::create_dir_all(&root).await?;

        // Random prefix keeps names unique across users and across
        // re-uploads of the same file.
        let stored_name = format!("{}_{}", Uuid::new_v4().simple(), safe_name);
        let path = root.join(&stored_name);
        fs::write(&path, &body).await?;

        Ok(StoredFile {
            name: stored_name,
            path,
        })
    }

    async fn rename(&self, old_path: &Path, new_path: &Path) -> Result<(), StorageError> {
        match fs::metadata(old_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(old_path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        }
        if fs::metadata(new_path).await.is_ok() {
            return Err(StorageError::NameConflict(new_path.to_path_buf()));
        }
        fs::rename(old_path, new_path).await?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_stream(&self, path: &Path) -> Result<fs::File, StorageError> {
        match fs::File::open(path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Strip any path components from a client-supplied name and replace
/// characters that are unsafe in file names.
pub fn sanitize_file_name(file_name: &str) -> Result<String, StorageError> {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
        tracing::warn!(file_name, "path components in client file name");
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.' || c == '_') {
        return Err(StorageError::InvalidName(file_name.to_string()));
    }

    Ok(sanitized)
}

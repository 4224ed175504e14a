use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::LocalBackendConfig;
use crate::error::{Result, StorageError};
use crate::storage::backend::{unavailable, BlobBackend};

/// Local file system blob backend
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(config: &LocalBackendConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root_path),
        }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobBackend for LocalBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let full_path = self.full_path(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("create blob directory", e))?;
        }

        // Full rewrite on every call keeps retried puts byte-identical.
        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| unavailable("create blob file", e))?;
        file.write_all(&data)
            .await
            .map_err(|e| unavailable("write blob", e))?;
        file.flush()
            .await
            .map_err(|e| unavailable("flush blob", e))?;

        tracing::debug!("Saved blob to {:?}", full_path);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let full_path = self.full_path(key);

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("blob not found: {}", key))
            } else {
                unavailable("read blob", e)
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key);

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {:?}", full_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Absent key; idempotent delete succeeds.
                return Ok(());
            }
            Err(e) => return Err(unavailable("delete blob", e)),
        }

        // Prune now-empty directories up to the root.
        let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current_dir {
            if dir == self.root {
                break;
            }
            match fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    if matches!(entries.next_entry().await, Ok(Some(_))) {
                        break;
                    }
                    let _ = fs::remove_dir(&dir).await;
                }
                Err(_) => break,
            }
            current_dir = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.full_path(key).exists())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

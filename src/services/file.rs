use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, StorageError};
use crate::models::{DeleteMode, FileRecord, FileVersion, FolderRecord, PathItem};
use crate::services::activity::ActivityService;
use crate::services::folder::FolderLocks;
use crate::storage::{with_retry, BlobBackend, RetryConfig};

/// File service
///
/// Owns the consistency protocol between the blob backend and the metadata
/// store: content is written before any row references it, and content is
/// removed before any row stops referencing it. The two systems share no
/// transaction, so ordering is what keeps a crash from leaving a record that
/// points at nothing. An orphaned blob is the acceptable leftover; a dangling
/// reference never is.
pub struct FileService;

impl FileService {
    /// Upload new content as a new file.
    ///
    /// Blob write first, metadata insert second. If the insert fails, the
    /// just-written blob is deleted again before the error surfaces, so a
    /// failed upload leaves at most a transient orphan.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        db: &Database,
        backend: &dyn BlobBackend,
        locks: &FolderLocks,
        retry: &RetryConfig,
        owner_id: &str,
        folder_id: Option<&str>,
        file_name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<FileRecord> {
        validate_name(file_name)?;

        if let Some(folder_id) = folder_id {
            Self::require_folder(db, folder_id).await?;
            if locks.is_locked(folder_id).await {
                return Err(StorageError::ConflictingUpdate(format!(
                    "folder {} is being deleted",
                    folder_id
                )));
            }
        }

        let blob_key = backend.generate_key(file_name);
        let size = data.len() as i64;

        with_retry(retry, || backend.put(&blob_key, data.clone())).await?;

        let file_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let path = Self::logical_path(db, folder_id, file_name).await?;

        let inserted = Self::insert_file_with_version(
            db,
            &file_id,
            owner_id,
            folder_id,
            file_name,
            &path,
            size,
            content_type,
            &blob_key,
            &now,
        )
        .await;

        if let Err(e) = inserted {
            // Compensating delete: without it the error would leave a blob
            // no record can ever reach.
            if let Err(cleanup) = with_retry(retry, || backend.delete(&blob_key)).await {
                tracing::warn!(
                    "compensating delete of blob {} failed after metadata insert error: {}",
                    blob_key,
                    cleanup
                );
            }
            return Err(e);
        }

        ActivityService::record(db, owner_id, "file.upload", &file_id, Some(file_name)).await;

        Self::get_file(db, &file_id).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_file_with_version(
        db: &Database,
        file_id: &str,
        owner_id: &str,
        folder_id: Option<&str>,
        file_name: &str,
        path: &str,
        size: i64,
        content_type: Option<&str>,
        blob_key: &str,
        now: &str,
    ) -> Result<()> {
        let mut tx = db.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (id, owner_id, folder_id, name, path, size, content_type, blob_key, lifecycle, row_version, created_at, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', 0, ?, ?)
            "#,
        )
        .bind(file_id)
        .bind(owner_id)
        .bind(folder_id)
        .bind(file_name)
        .bind(path)
        .bind(size)
        .bind(content_type)
        .bind(blob_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO file_versions (id, file_id, version_no, blob_key, size, created_at)
            VALUES (?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(file_id)
        .bind(blob_key)
        .bind(size)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Download a file's current content.
    ///
    /// A live record whose blob the backend cannot find is an integrity
    /// fault, reported as `ContentMissing` rather than empty bytes.
    pub async fn download(
        db: &Database,
        backend: &dyn BlobBackend,
        file_id: &str,
    ) -> Result<(FileRecord, Bytes)> {
        let file = Self::get_active_file(db, file_id).await?;

        match backend.get(&file.blob_key).await {
            Ok(data) => Ok((file, data)),
            Err(StorageError::NotFound(_)) => {
                tracing::error!(
                    "metadata/blob desync: file {} is live but blob {} is gone",
                    file.id,
                    file.blob_key
                );
                Err(StorageError::ContentMissing(file.id))
            }
            Err(e) => Err(e),
        }
    }

    /// Rename a file. Metadata only; content is untouched.
    pub async fn rename(db: &Database, file_id: &str, new_name: &str) -> Result<FileRecord> {
        validate_name(new_name)?;

        let file = Self::get_active_file(db, file_id).await?;
        let path = Self::logical_path(db, file.folder_id.as_deref(), new_name).await?;

        Self::guarded_metadata_update(db, &file, new_name, file.folder_id.as_deref(), &path).await
    }

    /// Move a file into another folder (or the root). Metadata only.
    pub async fn move_file(
        db: &Database,
        file_id: &str,
        new_folder_id: Option<&str>,
    ) -> Result<FileRecord> {
        let file = Self::get_active_file(db, file_id).await?;

        if let Some(folder_id) = new_folder_id {
            Self::require_folder(db, folder_id).await?;
        }

        let path = Self::logical_path(db, new_folder_id, &file.name).await?;

        Self::guarded_metadata_update(db, &file, &file.name, new_folder_id, &path).await
    }

    async fn guarded_metadata_update(
        db: &Database,
        file: &FileRecord,
        name: &str,
        folder_id: Option<&str>,
        path: &str,
    ) -> Result<FileRecord> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET name = ?, folder_id = ?, path = ?, row_version = row_version + 1
            WHERE id = ? AND row_version = ? AND lifecycle = 'active'
            "#,
        )
        .bind(name)
        .bind(folder_id)
        .bind(path)
        .bind(&file.id)
        .bind(file.row_version)
        .execute(db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::losing_racer_error(db, &file.id).await?);
        }

        Self::get_file(db, &file.id).await
    }

    /// Bind new content to an existing file as its next version.
    ///
    /// The previous version's blob stays addressable from its version row;
    /// retention is unlimited.
    pub async fn upload_version(
        db: &Database,
        backend: &dyn BlobBackend,
        retry: &RetryConfig,
        file_id: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<FileVersion> {
        let file = Self::get_active_file(db, file_id).await?;

        let blob_key = backend.generate_key(&file.name);
        let size = data.len() as i64;

        with_retry(retry, || backend.put(&blob_key, data.clone())).await?;

        let now = Utc::now().to_rfc3339();
        let version_id = Uuid::new_v4().to_string();

        let appended =
            Self::append_version(db, &file, &version_id, &blob_key, size, content_type, &now).await;

        match appended {
            Ok(()) => {}
            Err(e) => {
                if let Err(cleanup) = with_retry(retry, || backend.delete(&blob_key)).await {
                    tracing::warn!(
                        "compensating delete of blob {} failed after version append error: {}",
                        blob_key,
                        cleanup
                    );
                }
                return Err(e);
            }
        }

        ActivityService::record(db, &file.owner_id, "file.version", file_id, Some(&file.name))
            .await;

        let version: FileVersion = sqlx::query_as("SELECT * FROM file_versions WHERE id = ?")
            .bind(&version_id)
            .fetch_one(db.pool())
            .await?;
        Ok(version)
    }

    async fn append_version(
        db: &Database,
        file: &FileRecord,
        version_id: &str,
        blob_key: &str,
        size: i64,
        content_type: Option<&str>,
        now: &str,
    ) -> Result<()> {
        let mut tx = db.pool().begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE files
            SET blob_key = ?, size = ?, content_type = COALESCE(?, content_type),
                uploaded_at = ?, row_version = row_version + 1
            WHERE id = ? AND row_version = ? AND lifecycle = 'active'
            "#,
        )
        .bind(blob_key)
        .bind(size)
        .bind(content_type)
        .bind(now)
        .bind(&file.id)
        .bind(file.row_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Self::losing_racer_error(db, &file.id).await?);
        }

        let next_no: (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version_no), 0) + 1 FROM file_versions WHERE file_id = ?",
        )
        .bind(&file.id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO file_versions (id, file_id, version_no, blob_key, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(version_id)
        .bind(&file.id)
        .bind(next_no.0)
        .bind(blob_key)
        .bind(size)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a file.
    ///
    /// Every referenced blob (current content plus all versions) is removed
    /// first; only when the backend has let go of the content does the
    /// metadata row get removed (Hard) or marked soft_deleted (Soft). A
    /// backend `NotFound` during cleanup counts as success, so deletes are
    /// idempotent at the blob level. Concurrent deletes of the same id are
    /// decided by the row_version guard: one wins, the other observes
    /// `NotFound` or `ConflictingUpdate`.
    pub async fn delete(
        db: &Database,
        backend: &dyn BlobBackend,
        retry: &RetryConfig,
        file_id: &str,
        mode: DeleteMode,
    ) -> Result<()> {
        let file: FileRecord = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("file not found: {}", file_id)))?;

        match (file.is_active(), mode) {
            (true, _) => {}
            // A soft-deleted record has no blobs left; hard delete just
            // drops the row.
            (false, DeleteMode::Hard) => {}
            (false, DeleteMode::Soft) => {
                return Err(StorageError::NotFound(format!(
                    "file not found: {}",
                    file_id
                )));
            }
        }

        if file.is_active() {
            for key in Self::referenced_blob_keys(db, &file).await? {
                match with_retry(retry, || backend.delete(&key)).await {
                    Ok(()) => {}
                    Err(StorageError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let removed = match mode {
            DeleteMode::Hard => {
                sqlx::query("DELETE FROM files WHERE id = ? AND row_version = ?")
                    .bind(&file.id)
                    .bind(file.row_version)
                    .execute(db.pool())
                    .await?
            }
            DeleteMode::Soft => {
                let mut tx = db.pool().begin().await?;
                let result = sqlx::query(
                    r#"
                    UPDATE files
                    SET lifecycle = 'soft_deleted', row_version = row_version + 1
                    WHERE id = ? AND row_version = ?
                    "#,
                )
                .bind(&file.id)
                .bind(file.row_version)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() > 0 {
                    sqlx::query("DELETE FROM file_versions WHERE file_id = ?")
                        .bind(&file.id)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
                result
            }
        };

        if removed.rows_affected() == 0 {
            return Err(Self::losing_racer_error(db, &file.id).await?);
        }

        ActivityService::record(db, &file.owner_id, "file.delete", &file.id, Some(&file.name))
            .await;

        Ok(())
    }

    /// List a file's versions in creation order.
    pub async fn list_versions(db: &Database, file_id: &str) -> Result<Vec<FileVersion>> {
        Self::get_active_file(db, file_id).await?;

        let versions = sqlx::query_as(
            "SELECT * FROM file_versions WHERE file_id = ? ORDER BY version_no ASC",
        )
        .bind(file_id)
        .fetch_all(db.pool())
        .await?;
        Ok(versions)
    }

    /// Get a file by ID regardless of lifecycle state.
    pub async fn get_file(db: &Database, file_id: &str) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("file not found: {}", file_id)))
    }

    /// Get a file by ID; deleted records read as absent.
    pub async fn get_active_file(db: &Database, file_id: &str) -> Result<FileRecord> {
        let file = Self::get_file(db, file_id).await?;
        if !file.is_active() {
            return Err(StorageError::NotFound(format!(
                "file not found: {}",
                file_id
            )));
        }
        Ok(file)
    }

    /// Every blob key the record still references: current content plus all
    /// version history, deduplicated.
    async fn referenced_blob_keys(db: &Database, file: &FileRecord) -> Result<Vec<String>> {
        let mut keys: Vec<String> =
            sqlx::query_scalar("SELECT blob_key FROM file_versions WHERE file_id = ?")
                .bind(&file.id)
                .fetch_all(db.pool())
                .await?;
        keys.push(file.blob_key.clone());
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Distinguish why a guarded write affected no rows.
    async fn losing_racer_error(db: &Database, file_id: &str) -> Result<StorageError> {
        let file: Option<FileRecord> = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(db.pool())
            .await?;

        Ok(match file {
            Some(f) if f.is_active() => {
                StorageError::ConflictingUpdate(format!("file {}", file_id))
            }
            _ => StorageError::NotFound(format!("file not found: {}", file_id)),
        })
    }

    /// Breadcrumb from the root to the given folder.
    pub async fn build_path(db: &Database, folder_id: Option<&str>) -> Result<Vec<PathItem>> {
        let mut path = Vec::new();
        let mut current_id = folder_id.map(|s| s.to_string());

        while let Some(id) = current_id {
            let folder: Option<FolderRecord> =
                sqlx::query_as("SELECT * FROM folders WHERE id = ?")
                    .bind(&id)
                    .fetch_optional(db.pool())
                    .await?;

            match folder {
                Some(f) => {
                    path.push(PathItem {
                        id: f.id.clone(),
                        name: f.name.clone(),
                    });
                    current_id = f.parent_id;
                }
                None => break,
            }

            // Defensive bound; the parent relation is supposed to be a forest.
            if path.len() > crate::services::folder::MAX_FOLDER_DEPTH {
                return Err(StorageError::validation(
                    "folder_id",
                    "folder ancestry exceeds maximum depth",
                ));
            }
        }

        path.reverse();
        Ok(path)
    }

    async fn logical_path(
        db: &Database,
        folder_id: Option<&str>,
        file_name: &str,
    ) -> Result<String> {
        let breadcrumb = Self::build_path(db, folder_id).await?;
        let mut parts: Vec<String> = breadcrumb.into_iter().map(|p| p.name).collect();
        parts.push(file_name.to_string());
        Ok(format!("/{}", parts.join("/")))
    }

    async fn require_folder(db: &Database, folder_id: &str) -> Result<FolderRecord> {
        sqlx::query_as("SELECT * FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("folder not found: {}", folder_id)))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StorageError::validation("name", "must not be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(StorageError::validation(
            "name",
            "must not contain path separators",
        ));
    }
    if name.len() > 255 {
        return Err(StorageError::validation("name", "too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name(&"x".repeat(300)).is_err());
    }
}

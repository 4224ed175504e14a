use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, StorageError};
use crate::models::{
    CascadeFailure, DeleteMode, FileRecord, FolderContents, FolderDeleteReport, FolderRecord,
};
use crate::services::activity::ActivityService;
use crate::services::file::FileService;
use crate::storage::{BlobBackend, RetryConfig};

/// Upper bound on folder nesting during traversal. The parent relation is
/// supposed to be a forest; this guard turns a corrupted hierarchy into an
/// error instead of an unbounded walk.
pub const MAX_FOLDER_DEPTH: usize = 128;

/// Folder ids currently being cascade-deleted.
///
/// Serialization strategy for delete-vs-upload: every folder in a subtree is
/// locked for the whole cascade, and uploads targeting a locked folder fail
/// with `ConflictingUpdate`. In-process only; a multi-process deployment
/// would move this into the database.
#[derive(Default)]
pub struct FolderLocks {
    locked: Mutex<HashSet<String>>,
}

impl FolderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_locked(&self, folder_id: &str) -> bool {
        self.locked.lock().unwrap().contains(folder_id)
    }

    fn try_acquire<'a>(&'a self, folder_ids: &[String]) -> Result<FolderLockGuard<'a>> {
        let mut locked = self.locked.lock().unwrap();
        if let Some(busy) = folder_ids.iter().find(|id| locked.contains(*id)) {
            return Err(StorageError::ConflictingUpdate(format!(
                "folder {} is already being deleted",
                busy
            )));
        }
        for id in folder_ids {
            locked.insert(id.clone());
        }
        Ok(FolderLockGuard {
            locks: self,
            folder_ids: folder_ids.to_vec(),
        })
    }
}

struct FolderLockGuard<'a> {
    locks: &'a FolderLocks,
    folder_ids: Vec<String>,
}

impl Drop for FolderLockGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.locks.locked.lock().unwrap();
        for id in &self.folder_ids {
            locked.remove(id);
        }
    }
}

/// Folder service
pub struct FolderService;

impl FolderService {
    /// Create a folder.
    pub async fn create_folder(
        db: &Database,
        owner_id: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FolderRecord> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(StorageError::validation("name", "invalid folder name"));
        }

        if let Some(parent_id) = parent_id {
            Self::get_folder(db, parent_id).await?;
        }

        let folder_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO folders (id, name, parent_id, owner_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&folder_id)
        .bind(name)
        .bind(parent_id)
        .bind(owner_id)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Self::get_folder(db, &folder_id).await
    }

    /// Get a folder by ID
    pub async fn get_folder(db: &Database, folder_id: &str) -> Result<FolderRecord> {
        sqlx::query_as("SELECT * FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("folder not found: {}", folder_id)))
    }

    /// Directly contained live files and child folders.
    pub async fn contents(db: &Database, folder_id: &str) -> Result<FolderContents> {
        let folder = Self::get_folder(db, folder_id).await?;

        let files: Vec<FileRecord> = sqlx::query_as(
            "SELECT * FROM files WHERE folder_id = ? AND lifecycle = 'active' ORDER BY name ASC",
        )
        .bind(folder_id)
        .fetch_all(db.pool())
        .await?;

        let folders: Vec<FolderRecord> =
            sqlx::query_as("SELECT * FROM folders WHERE parent_id = ? ORDER BY name ASC")
                .bind(folder_id)
                .fetch_all(db.pool())
                .await?;

        Ok(FolderContents {
            folder,
            files,
            folders,
        })
    }

    /// Delete a folder and everything under it.
    ///
    /// Post-order: contained files go through the file delete protocol and
    /// child folders are emptied before any folder row is removed. The walk
    /// is iterative with an explicit stack; a cycle or over-deep hierarchy is
    /// rejected up front and nothing is deleted. Per-file failures do not
    /// stop the cascade; they are accumulated in the report, and a folder
    /// row survives whenever anything under it could not be cleaned.
    /// Cancellation stops between items, leaving exactly the state the
    /// report describes.
    pub async fn delete_folder(
        db: &Database,
        backend: &dyn BlobBackend,
        locks: &FolderLocks,
        retry: &RetryConfig,
        folder_id: &str,
        cancel: &CancellationToken,
    ) -> Result<FolderDeleteReport> {
        let root = Self::get_folder(db, folder_id).await?;

        // Pre-order subtree listing; reversed later for post-order work.
        let subtree = Self::collect_subtree(db, &root).await?;
        let subtree_ids: Vec<String> = subtree.iter().map(|f| f.id.clone()).collect();
        let parent_of: HashMap<String, Option<String>> = subtree
            .iter()
            .map(|f| (f.id.clone(), f.parent_id.clone()))
            .collect();

        let _guard = locks.try_acquire(&subtree_ids)?;

        let mut report = FolderDeleteReport::default();
        // Folders whose subtree could not be fully cleaned; survive the cascade.
        let mut dirty: HashSet<String> = HashSet::new();

        'folders: for folder in subtree.iter().rev() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let files: Vec<FileRecord> = sqlx::query_as("SELECT * FROM files WHERE folder_id = ?")
                .bind(&folder.id)
                .fetch_all(db.pool())
                .await?;

            for file in files {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'folders;
                }

                match FileService::delete(db, backend, retry, &file.id, DeleteMode::Hard).await {
                    Ok(()) => report.files_deleted += 1,
                    // Already gone; a concurrent delete got there first.
                    Err(StorageError::NotFound(_)) => {}
                    Err(e) => {
                        tracing::warn!(
                            "cascade delete of file {} under folder {} failed: {}",
                            file.id,
                            folder.id,
                            e
                        );
                        report.failures.push(CascadeFailure {
                            file_id: file.id.clone(),
                            name: file.name.clone(),
                            error: e.to_string(),
                        });
                        Self::mark_dirty(&parent_of, &mut dirty, &folder.id);
                    }
                }
            }

            if dirty.contains(&folder.id) {
                continue;
            }

            sqlx::query("DELETE FROM folders WHERE id = ?")
                .bind(&folder.id)
                .execute(db.pool())
                .await?;
            report.folders_deleted += 1;
        }

        if report.cancelled {
            tracing::info!(
                "folder delete of {} cancelled: {} files and {} folders removed",
                folder_id,
                report.files_deleted,
                report.folders_deleted
            );
        }

        ActivityService::record(
            db,
            &root.owner_id,
            "folder.delete",
            &root.id,
            Some(&root.name),
        )
        .await;

        Ok(report)
    }

    /// Walk the subtree iteratively, rejecting cycles and runaway depth.
    async fn collect_subtree(db: &Database, root: &FolderRecord) -> Result<Vec<FolderRecord>> {
        let mut ordered: Vec<FolderRecord> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<(FolderRecord, usize)> = vec![(root.clone(), 0)];

        while let Some((folder, depth)) = stack.pop() {
            if depth > MAX_FOLDER_DEPTH {
                return Err(StorageError::validation(
                    "folder_id",
                    "folder hierarchy exceeds maximum depth",
                ));
            }
            if !visited.insert(folder.id.clone()) {
                return Err(StorageError::validation(
                    "folder_id",
                    format!("cycle detected in folder hierarchy at {}", folder.id),
                ));
            }

            let children: Vec<FolderRecord> =
                sqlx::query_as("SELECT * FROM folders WHERE parent_id = ?")
                    .bind(&folder.id)
                    .fetch_all(db.pool())
                    .await?;

            ordered.push(folder);
            for child in children {
                stack.push((child, depth + 1));
            }
        }

        Ok(ordered)
    }

    /// A failure under `folder_id` keeps that folder and every ancestor row.
    fn mark_dirty(
        parent_of: &HashMap<String, Option<String>>,
        dirty: &mut HashSet<String>,
        folder_id: &str,
    ) {
        let mut current = Some(folder_id.to_string());
        while let Some(id) = current {
            if !dirty.insert(id.clone()) {
                break;
            }
            current = parent_of.get(&id).cloned().flatten();
        }
    }
}

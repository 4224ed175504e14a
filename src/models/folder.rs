use serde::Serialize;
use sqlx::FromRow;

use super::file::FileRecord;

/// Folder model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub owner_id: String,
    pub created_at: String,
}

/// Directly contained files and child folders of one folder.
#[derive(Debug, Serialize)]
pub struct FolderContents {
    pub folder: FolderRecord,
    pub files: Vec<FileRecord>,
    pub folders: Vec<FolderRecord>,
}

/// One file the cascade could not clean up.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeFailure {
    pub file_id: String,
    pub name: String,
    pub error: String,
}

/// Outcome of a recursive folder deletion.
///
/// The cascade is best-effort: cleaned items are gone even when others
/// failed, and the caller gets the full failure list instead of a silent
/// swallow. `cancelled` marks a run stopped mid-traversal; everything not
/// counted here is still present.
#[derive(Debug, Default, Serialize)]
pub struct FolderDeleteReport {
    pub files_deleted: u64,
    pub folders_deleted: u64,
    pub failures: Vec<CascadeFailure>,
    pub cancelled: bool,
}

impl FolderDeleteReport {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

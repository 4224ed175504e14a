use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of a file record.
///
/// Replaces the nullable is_active/is_delete integer pair: a record in either
/// deleted state has no addressable blob left behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLifecycle {
    Active,
    SoftDeleted,
    HardDeleted,
}

impl FileLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileLifecycle::Active => "active",
            FileLifecycle::SoftDeleted => "soft_deleted",
            FileLifecycle::HardDeleted => "hard_deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(FileLifecycle::Active),
            "soft_deleted" => Some(FileLifecycle::SoftDeleted),
            "hard_deleted" => Some(FileLifecycle::HardDeleted),
            _ => None,
        }
    }
}

/// How a delete should dispose of the metadata row. Blob content is removed
/// either way, before the row is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Keep the row, marked soft_deleted.
    Soft,
    /// Remove the row.
    Hard,
}

/// File model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub folder_id: Option<String>,
    pub name: String,
    /// Logical path, recomputed on rename/move.
    pub path: String,
    pub size: i64,
    pub content_type: Option<String>,
    /// Opaque handle addressing the current content in the blob backend.
    pub blob_key: String,
    pub lifecycle: String,
    pub row_version: i64,
    pub created_at: String,
    pub uploaded_at: String,
}

impl FileRecord {
    pub fn lifecycle(&self) -> Option<FileLifecycle> {
        FileLifecycle::parse(&self.lifecycle)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle() == Some(FileLifecycle::Active)
    }
}

/// Path item for breadcrumb
#[derive(Debug, Clone, Serialize)]
pub struct PathItem {
    pub id: String,
    pub name: String,
}

use serde::Serialize;
use sqlx::FromRow;

/// One immutable content version of a file. Append-only; version_no is
/// monotonic per file, starting at 1 for the initial upload.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileVersion {
    pub id: String,
    pub file_id: String,
    pub version_no: i64,
    pub blob_key: String,
    pub size: i64,
    pub created_at: String,
}

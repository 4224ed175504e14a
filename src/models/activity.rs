use serde::Serialize;
use sqlx::FromRow;

/// Activity log entry. Appended best-effort by the services; never load-bearing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ActivityLog {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub target_id: String,
    pub detail: Option<String>,
    pub created_at: String,
}

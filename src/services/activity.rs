use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::models::ActivityLog;

/// Activity log service. Appends are best-effort: a failed insert is logged
/// and never fails the operation that triggered it.
pub struct ActivityService;

impl ActivityService {
    pub async fn record(
        db: &Database,
        user_id: &str,
        action: &str,
        target_id: &str,
        detail: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO activity_log (id, user_id, action, target_id, detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(action)
        .bind(target_id)
        .bind(detail)
        .bind(Utc::now().to_rfc3339())
        .execute(db.pool())
        .await;

        if let Err(e) = result {
            tracing::warn!("failed to record activity {} for {}: {}", action, user_id, e);
        }
    }

    pub async fn list_for_user(db: &Database, user_id: &str) -> Result<Vec<ActivityLog>> {
        let entries = sqlx::query_as(
            "SELECT * FROM activity_log WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(db.pool())
        .await?;
        Ok(entries)
    }
}

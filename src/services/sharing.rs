use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, StorageError};
use crate::models::{Permission, PermissionLevel, SharedFile, SharedWithMeItem, User};
use crate::services::activity::ActivityService;
use crate::services::file::FileService;

const SHARE_TOKEN_LEN: usize = 16;
const TOKEN_ATTEMPTS: usize = 10;

/// Sharing service
pub struct SharingService;

impl SharingService {
    /// Grant a user access to a file at a permission level.
    ///
    /// The file must be live and the recipient must exist; an unrecognized
    /// permission level is rejected before anything is written.
    pub async fn share_file(
        db: &Database,
        owner_id: &str,
        file_id: &str,
        recipient_id: &str,
        permission_level: &str,
    ) -> Result<SharedFile> {
        let level = PermissionLevel::parse(permission_level).ok_or_else(|| {
            StorageError::validation(
                "permission_level",
                format!("unrecognized permission level: {}", permission_level),
            )
        })?;

        let file = FileService::get_active_file(db, file_id).await?;

        let recipient: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(recipient_id)
            .fetch_optional(db.pool())
            .await?;
        if recipient.is_none() {
            return Err(StorageError::NotFound(format!(
                "user not found: {}",
                recipient_id
            )));
        }

        let share_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut last_error: Option<sqlx::Error> = None;
        let mut created = false;
        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_share_token();

            let result =
                Self::insert_grant(db, &share_id, &file.id, recipient_id, level, &token, &now)
                    .await;

            match result {
                Ok(()) => {
                    created = true;
                    break;
                }
                Err(sqlx::Error::Database(db_err))
                    if db_err.message().contains("shared_files.share_link") =>
                {
                    last_error = Some(sqlx::Error::Database(db_err));
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !created {
            return Err(StorageError::Database(last_error.unwrap_or(
                sqlx::Error::Protocol("failed to generate unique share link".into()),
            )));
        }

        ActivityService::record(db, owner_id, "file.share", &file.id, Some(recipient_id)).await;

        Self::get_share(db, &share_id).await
    }

    /// Insert the grant and its companion permission row atomically.
    async fn insert_grant(
        db: &Database,
        share_id: &str,
        file_id: &str,
        recipient_id: &str,
        level: PermissionLevel,
        token: &str,
        now: &str,
    ) -> std::result::Result<(), sqlx::Error> {
        let mut tx = db.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO shared_files (id, file_id, recipient_id, permission, share_link, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(share_id)
        .bind(file_id)
        .bind(recipient_id)
        .bind(level.as_str())
        .bind(token)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO permissions (id, file_id, folder_id, user_id, access_level, created_at)
            VALUES (?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(file_id)
        .bind(recipient_id)
        .bind(level.access_level())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    /// Get a share grant by ID
    pub async fn get_share(db: &Database, share_id: &str) -> Result<SharedFile> {
        sqlx::query_as("SELECT * FROM shared_files WHERE id = ?")
            .bind(share_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("share not found: {}", share_id)))
    }

    /// All grants where the user is the recipient, enriched with each file's
    /// display name. Grants on deleted files are filtered out.
    pub async fn list_shared_with_me(
        db: &Database,
        user_id: &str,
    ) -> Result<Vec<SharedWithMeItem>> {
        let items = sqlx::query_as(
            r#"
            SELECT
              s.id,
              s.file_id,
              f.name AS file_name,
              s.permission,
              s.share_link,
              s.created_at
            FROM shared_files s
            JOIN files f ON s.file_id = f.id
            WHERE s.recipient_id = ? AND f.lifecycle = 'active'
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db.pool())
        .await?;
        Ok(items)
    }

    /// Revoke a share grant. Missing id is `NotFound`; there is nothing else
    /// to roll back.
    pub async fn revoke_share(db: &Database, share_id: &str) -> Result<()> {
        let share: Option<SharedFile> = sqlx::query_as("SELECT * FROM shared_files WHERE id = ?")
            .bind(share_id)
            .fetch_optional(db.pool())
            .await?;

        let share = share
            .ok_or_else(|| StorageError::NotFound(format!("share not found: {}", share_id)))?;

        let mut tx = db.pool().begin().await?;

        sqlx::query("DELETE FROM shared_files WHERE id = ?")
            .bind(&share.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM permissions WHERE file_id = ? AND user_id = ?")
            .bind(&share.file_id)
            .bind(&share.recipient_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        ActivityService::record(
            db,
            &share.recipient_id,
            "file.share.revoke",
            &share.file_id,
            None,
        )
        .await;

        Ok(())
    }

    /// The access level a user holds on a file, if any grant exists.
    pub async fn access_level_for(
        db: &Database,
        file_id: &str,
        user_id: &str,
    ) -> Result<Option<PermissionLevel>> {
        let permission: Option<Permission> = sqlx::query_as(
            "SELECT * FROM permissions WHERE file_id = ? AND user_id = ? ORDER BY access_level DESC LIMIT 1",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(db.pool())
        .await?;

        Ok(permission.and_then(|p| PermissionLevel::from_access_level(p.access_level)))
    }
}

fn generate_share_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_TOKEN_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_tokens_have_fixed_length_and_vary() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_eq!(a.len(), SHARE_TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

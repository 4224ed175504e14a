use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Permission level attached to a share grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    View,
    Comment,
    Edit,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::View => "View",
            PermissionLevel::Comment => "Comment",
            PermissionLevel::Edit => "Edit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "View" => Some(PermissionLevel::View),
            "Comment" => Some(PermissionLevel::Comment),
            "Edit" => Some(PermissionLevel::Edit),
            _ => None,
        }
    }

    /// Numeric level stored in the permissions table, ascending capability.
    pub fn access_level(&self) -> i64 {
        match self {
            PermissionLevel::View => 1,
            PermissionLevel::Comment => 2,
            PermissionLevel::Edit => 3,
        }
    }

    pub fn from_access_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(PermissionLevel::View),
            2 => Some(PermissionLevel::Comment),
            3 => Some(PermissionLevel::Edit),
            _ => None,
        }
    }
}

/// Share grant model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SharedFile {
    pub id: String,
    pub file_id: String,
    pub recipient_id: String,
    pub permission: String,
    pub share_link: String,
    pub created_at: String,
}

impl SharedFile {
    pub fn permission_level(&self) -> Option<PermissionLevel> {
        PermissionLevel::parse(&self.permission)
    }
}

/// Grant as listed for the recipient, enriched with the file's display name.
#[derive(Debug, Serialize, FromRow)]
pub struct SharedWithMeItem {
    pub id: String,
    pub file_id: String,
    pub file_name: String,
    pub permission: String,
    pub share_link: String,
    pub created_at: String,
}

/// Permission row; written alongside a share grant.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Permission {
    pub id: String,
    pub file_id: Option<String>,
    pub folder_id: Option<String>,
    pub user_id: String,
    pub access_level: i64,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_level_round_trip() {
        for level in [
            PermissionLevel::View,
            PermissionLevel::Comment,
            PermissionLevel::Edit,
        ] {
            assert_eq!(PermissionLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(PermissionLevel::parse("Delete"), None);
        assert_eq!(PermissionLevel::parse("view"), None);
    }

    #[test]
    fn access_levels_ascend_with_capability() {
        assert!(PermissionLevel::View.access_level() < PermissionLevel::Comment.access_level());
        assert!(PermissionLevel::Comment.access_level() < PermissionLevel::Edit.access_level());
        for level in [
            PermissionLevel::View,
            PermissionLevel::Comment,
            PermissionLevel::Edit,
        ] {
            assert_eq!(
                PermissionLevel::from_access_level(level.access_level()),
                Some(level)
            );
        }
        assert_eq!(PermissionLevel::from_access_level(0), None);
    }
}

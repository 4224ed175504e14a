use serde::Serialize;
use sqlx::FromRow;

/// User model. The core only needs users as foreign-key targets and share
/// recipients; credentials and registration live outside it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

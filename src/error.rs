use std::fmt;

/// Core error type
///
/// The request layer owns the mapping to transport status codes; nothing in
/// this enum carries transport vocabulary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Configuration named a backend this build does not know.
    /// Raised at selection time, never deferred to first use.
    #[error("unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    /// Transient or permanent I/O failure talking to the blob backend.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A live metadata record points at content the backend no longer has.
    /// Integrity fault, not a client error.
    #[error("content missing for file {0}")]
    ContentMissing(String),

    /// A concurrent mutation won the race on the same row.
    #[error("conflicting update on {0}")]
    ConflictingUpdate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn validation(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a bounded retry could plausibly help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

//! Core of a file-storage backend: uploads, downloads, versioning, folder
//! hierarchy, and share grants, with file bytes in a pluggable blob backend
//! and metadata in sqlite. The HTTP layer in front of this crate is expected
//! to pass validated inputs and an authenticated user id; nothing here
//! derives identity or speaks transport.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use config::Config;
pub use db::Database;
pub use error::{Result, StorageError};
pub use services::{ActivityService, FileService, FolderLocks, FolderService, SharingService};
pub use storage::{select_backend, BackendKind, BlobBackend, RetryConfig};

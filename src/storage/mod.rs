pub mod backend;
pub mod cloud;
pub mod local;

pub use backend::{with_retry, BlobBackend, RetryConfig};
pub use cloud::CloudBlobBackend;
pub use local::LocalBackend;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// Recognized blob backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    CloudBlob,
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::CloudBlob => "CloudBlob",
            BackendKind::Local => "Local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CloudBlob" => Some(BackendKind::CloudBlob),
            "Local" => Some(BackendKind::Local),
            _ => None,
        }
    }
}

/// Resolve the configured backend into an owned handle.
///
/// Called once at startup; an unrecognized selector string is a configuration
/// error and fails here, never on first use.
pub fn select_backend(config: &StorageConfig) -> Result<Arc<dyn BlobBackend>> {
    let kind = BackendKind::parse(&config.backend)
        .ok_or_else(|| StorageError::UnsupportedBackend(config.backend.clone()))?;

    let backend: Arc<dyn BlobBackend> = match kind {
        BackendKind::Local => Arc::new(LocalBackend::new(&config.local)),
        BackendKind::CloudBlob => Arc::new(CloudBlobBackend::new(&config.cloud)),
    };

    tracing::info!("Selected blob backend: {}", backend.backend_name());
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn known_backends_resolve() {
        let mut config = StorageConfig::default();

        config.backend = "Local".to_string();
        assert_eq!(select_backend(&config).unwrap().backend_name(), "local");

        config.backend = "CloudBlob".to_string();
        assert_eq!(
            select_backend(&config).unwrap().backend_name(),
            "cloud_blob"
        );
    }

    #[test]
    fn unknown_backend_fails_at_selection() {
        let mut config = StorageConfig::default();
        config.backend = "AzureBlob".to_string();

        match select_backend(&config) {
            Err(StorageError::UnsupportedBackend(name)) => assert_eq!(name, "AzureBlob"),
            other => panic!("expected UnsupportedBackend, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn backend_kind_round_trip() {
        for kind in [BackendKind::CloudBlob, BackendKind::Local] {
            assert_eq!(BackendKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BackendKind::parse("local"), None);
    }
}

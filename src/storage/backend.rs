use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::config::RetrySettings;
use crate::error::{Result, StorageError};

/// Blob backend contract
///
/// Content is addressed by opaque keys; the rest of the system cannot tell
/// which variant is active except through configuration.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Write content addressable later by `key`. Idempotent under retry with
    /// the same key.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Read the stored bytes. `NotFound` when the key is absent.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Remove content. Deleting an absent key succeeds; I/O failure is
    /// `BackendUnavailable`, never `NotFound`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a key holds content.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Produce a collision-resistant key traceable back to the original name.
    /// Concurrent uploads of identically named files never collide.
    fn generate_key(&self, original_name: &str) -> String {
        let (stem, extension) = match original_name.rfind('.') {
            Some(pos) if pos > 0 => (&original_name[..pos], &original_name[pos..]),
            _ => (original_name, ""),
        };

        let mut stem: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .take(64)
            .collect();
        if stem.is_empty() {
            stem.push_str("file");
        }

        let extension: String = extension
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
            .take(16)
            .collect();

        format!("{}-{}{}", stem, Uuid::new_v4(), extension)
    }

    /// Get the backend name
    fn backend_name(&self) -> &'static str;
}

/// Bounded retry policy for blob I/O.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
        }
    }
}

/// Run a blob operation with bounded retries and exponential backoff.
/// Only `BackendUnavailable` is retried; everything else surfaces at once.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() => {
                attempts += 1;
                if attempts >= config.max_attempts {
                    return Err(e);
                }
                tracing::debug!("retrying blob operation after failure: {}", e);
                sleep(config.initial_delay * 2u32.pow(attempts - 1)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Convenience for mapping transport failures.
pub(crate) fn unavailable(context: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::BackendUnavailable(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NullBackend;

    #[async_trait]
    impl BlobBackend for NullBackend {
        async fn put(&self, _key: &str, _data: Bytes) -> Result<()> {
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Bytes> {
            Err(StorageError::NotFound(key.to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        fn backend_name(&self) -> &'static str {
            "null"
        }
    }

    #[test]
    fn generated_keys_keep_name_and_extension() {
        let backend = NullBackend;
        let key = backend.generate_key("report final.pdf");
        assert!(key.starts_with("report_final-"));
        assert!(key.ends_with(".pdf"));
    }

    #[test]
    fn generated_keys_are_unique_for_same_name() {
        let backend = NullBackend;
        assert_ne!(backend.generate_key("a.txt"), backend.generate_key("a.txt"));
    }

    #[test]
    fn generated_key_for_hostile_name_is_opaque() {
        let backend = NullBackend;
        let key = backend.generate_key("../../etc/passwd");
        assert!(!key.contains('/'));
        assert!(!key.contains(".."));
    }

    #[tokio::test]
    async fn retry_is_bounded() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        };
        let result: Result<()> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::BackendUnavailable("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::BackendUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();
        let result: Result<()> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::NotFound("k".into())) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

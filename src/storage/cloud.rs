//! Cloud object-store blob backend.
//!
//! Talks to a COS-compatible object store over HTTP: one signed request per
//! put/get/delete, object keys mapped straight onto remote object names.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha1::{Digest, Sha1};
use urlencoding::encode;

use crate::config::CloudBackendConfig;
use crate::error::{Result, StorageError};
use crate::storage::backend::{unavailable, BlobBackend};

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_VALID_SECONDS: i64 = 600;

/// Request signer, sha1-HMAC over method and object path.
struct Signer<'a> {
    method: &'a str,
    url_path: &'a str,
}

impl<'a> Signer<'a> {
    fn new(method: &'a str, url_path: &'a str) -> Self {
        Self { method, url_path }
    }

    fn hmac_hex(key: &str, data: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|x| format!("{:02x}", x))
            .collect()
    }

    fn http_string(&self) -> String {
        format!("{}\n{}\n\n\n", self.method.to_lowercase(), self.url_path)
    }

    fn string_to_sign(&self, key_time: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.http_string());
        let digest: String = hasher
            .finalize()
            .iter()
            .map(|x| format!("{:02x}", x))
            .collect();
        format!("sha1\n{}\n{}\n", key_time, digest)
    }

    fn sign_with_key_time(&self, secret_id: &str, secret_key: &str, key_time: &str) -> String {
        let sign_key = Self::hmac_hex(secret_key, key_time);
        let signature = Self::hmac_hex(&sign_key, &self.string_to_sign(key_time));
        format!(
            "q-sign-algorithm=sha1&q-ak={}&q-sign-time={}&q-key-time={}&q-header-list=&q-url-param-list=&q-signature={}",
            secret_id, key_time, key_time, signature
        )
    }

    fn sign(&self, secret_id: &str, secret_key: &str) -> String {
        let start = Utc::now().timestamp();
        let key_time = format!("{};{}", start, start + SIGNATURE_VALID_SECONDS);
        self.sign_with_key_time(secret_id, secret_key, &key_time)
    }
}

/// Cloud object-store blob backend
pub struct CloudBlobBackend {
    config: CloudBackendConfig,
    client: reqwest::Client,
    host: String,
}

impl CloudBlobBackend {
    pub fn new(config: &CloudBackendConfig) -> Self {
        let host = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("{}.cos.{}.myqcloud.com", config.bucket, config.region));
        Self {
            config: config.clone(),
            client: reqwest::Client::new(),
            host,
        }
    }

    fn object_key(&self, key: &str) -> String {
        let clean = key.trim_start_matches('/');
        if self.config.base_path.is_empty() {
            clean.to_string()
        } else {
            format!("{}/{}", self.config.base_path.trim_end_matches('/'), clean)
        }
    }

    fn object_url(&self, object_key: &str) -> String {
        format!("https://{}/{}", self.host, encode(object_key))
    }

    async fn send(
        &self,
        method: reqwest::Method,
        object_key: &str,
        body: Option<Bytes>,
        content_type: Option<String>,
    ) -> Result<reqwest::Response> {
        let url_path = format!("/{}", encode(object_key));
        let authorization = Signer::new(method.as_str(), &url_path)
            .sign(&self.config.secret_id, &self.config.secret_key);

        let mut request = self
            .client
            .request(method, self.object_url(object_key))
            .header("Authorization", authorization);
        if let Some(ct) = content_type {
            request = request.header("Content-Type", ct);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        request
            .send()
            .await
            .map_err(|e| unavailable("object store request", e))
    }
}

#[async_trait]
impl BlobBackend for CloudBlobBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let object_key = self.object_key(key);
        let mime_type = mime_guess::from_path(key).first_or_octet_stream();

        // PUT overwrites whole objects, so a retried put cannot duplicate.
        let response = self
            .send(
                reqwest::Method::PUT,
                &object_key,
                Some(data),
                Some(mime_type.to_string()),
            )
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendUnavailable(format!(
                "object store upload failed for {}: {}",
                object_key,
                response.status()
            )));
        }

        tracing::debug!("Uploaded object {}", object_key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let object_key = self.object_key(key);
        let response = self
            .send(reqwest::Method::GET, &object_key, None, None)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(format!(
                "object not found: {}",
                key
            ))),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| unavailable("object store read", e)),
            status => Err(StorageError::BackendUnavailable(format!(
                "object store download failed for {}: {}",
                object_key, status
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let object_key = self.object_key(key);
        let response = self
            .send(reqwest::Method::DELETE, &object_key, None, None)
            .await?;

        match response.status() {
            // Absent key; idempotent delete succeeds.
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => {
                tracing::debug!("Deleted object {}", object_key);
                Ok(())
            }
            status => Err(StorageError::BackendUnavailable(format!(
                "object store delete failed for {}: {}",
                object_key, status
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let object_key = self.object_key(key);
        let response = self
            .send(reqwest::Method::HEAD, &object_key, None, None)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StorageError::BackendUnavailable(format!(
                "object store head failed for {}: {}",
                object_key, status
            ))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "cloud_blob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_string_layout() {
        let signer = Signer::new("PUT", "/docs%2Freport.pdf");
        assert_eq!(signer.http_string(), "put\n/docs%2Freport.pdf\n\n\n");
    }

    #[test]
    fn signature_is_deterministic_for_fixed_key_time() {
        let signer = Signer::new("GET", "/a.txt");
        let a = signer.sign_with_key_time("ak", "sk", "1;601");
        let b = signer.sign_with_key_time("ak", "sk", "1;601");
        assert_eq!(a, b);
        assert!(a.starts_with("q-sign-algorithm=sha1&q-ak=ak&q-sign-time=1;601"));
    }

    #[test]
    fn base_path_prefixes_object_keys() {
        let config = CloudBackendConfig {
            bucket: "b".into(),
            region: "r".into(),
            base_path: "tenant/".into(),
            ..Default::default()
        };
        let backend = CloudBlobBackend::new(&config);
        assert_eq!(backend.object_key("/k.bin"), "tenant/k.bin");
        assert_eq!(backend.host, "b.cos.r.myqcloud.com");
    }
}

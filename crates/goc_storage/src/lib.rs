//! Storage Adapter: the external-collaborator interface spec.md §6 requires
//! from outside the core (`put`, `sign`), plus a reference local-filesystem
//! implementation so the workspace is runnable without a real object store.
//!
//! Signed URLs are HMAC-SHA256 tags over `key:expiry`, grounded on
//! `goc_security::signing` (itself grounded on the teacher's
//! `signing::sha256` hash helper, generalized to HMAC).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use goc_ids::CorrelationId;
use goc_protocol::GocError;
use goc_security::{hmac_sign, verify_hmac};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// The storage interface the core depends on (spec.md §6). Implementations
/// live outside the core's business logic; this crate ships one reference
/// implementation ([`FilesystemStorage`]) rather than a production object
/// store client.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), GocError>;

    /// Issue an HTTPS URL expiring after `ttl`. `GocError::InvalidArgument`
    /// doubles as `NotFound` here since the core's error enum has no
    /// dedicated not-found kind (spec.md §7 lists errors at the job-manager
    /// level, not the storage-adapter level) — `artifact_url` in `goc_jobs`
    /// is what actually surfaces `NotFound` to the caller.
    async fn sign(&self, key: &str, ttl: Duration) -> Result<String, GocError>;

    async fn exists(&self, key: &str) -> Result<bool, GocError>;
}

/// A local-filesystem-backed [`StorageAdapter`] with HMAC-signed URLs
/// pointing at a local file:// style scheme. Suitable for tests and single-
/// node deployments; a real deployment would swap this for an S3/GCS
/// adapter behind the same trait.
pub struct FilesystemStorage {
    root: PathBuf,
    signing_key: Vec<u8>,
    base_url: String,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>, signing_key: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            signing_key: signing_key.into(),
            base_url: base_url.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn signing_message(key: &str, expires_at: DateTime<Utc>) -> String {
        format!("{key}:{}", expires_at.timestamp())
    }

    /// Verify a previously issued signed URL's query parameters. Exposed for
    /// the reference implementation's own tests and for a host that wants to
    /// validate a URL without re-deriving it.
    pub fn verify_signature(&self, key: &str, expires_at: DateTime<Utc>, signature: &str) -> bool {
        if expires_at < Utc::now() {
            return false;
        }
        verify_hmac(&self.signing_key, &Self::signing_message(key, expires_at), signature)
    }
}

fn internal(message: impl Into<String>) -> GocError {
    GocError::internal(message, CorrelationId::new())
}

#[async_trait]
impl StorageAdapter for FilesystemStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), GocError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| internal(format!("failed to create storage directory: {e}")))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| internal(format!("failed to write artifact {key}: {e}")))?;
        Ok(())
    }

    async fn sign(&self, key: &str, ttl: Duration) -> Result<String, GocError> {
        if !self.exists(key).await? {
            return Err(GocError::InvalidArgument {
                message: format!("no artifact stored at key {key}"),
                correlation_id: CorrelationId::new(),
            });
        }
        let expires_at = Utc::now()
            + ChronoDuration::from_std(ttl).map_err(|e| internal(format!("invalid ttl: {e}")))?;
        let signature = hmac_sign(&self.signing_key, &Self::signing_message(key, expires_at));
        Ok(format!(
            "{}/{key}?expires={}&sig={signature}",
            self.base_url.trim_end_matches('/'),
            expires_at.timestamp(),
        ))
    }

    async fn exists(&self, key: &str) -> Result<bool, GocError> {
        Ok(self.path_for(key).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> FilesystemStorage {
        FilesystemStorage::new(dir.path(), b"test-signing-key".to_vec(), "https://artifacts.example.com")
    }

    #[tokio::test]
    async fn put_then_sign_produces_a_verifiable_url() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.put("job-1/rows.json", b"[]".to_vec()).await.unwrap();

        let url = storage.sign("job-1/rows.json", Duration::from_secs(3600)).await.unwrap();
        assert!(url.starts_with("https://artifacts.example.com/job-1/rows.json?"));
    }

    #[tokio::test]
    async fn sign_fails_for_missing_key() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let err = storage.sign("missing", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, GocError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn expired_signature_fails_verification() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.put("job-1/rows.json", b"[]".to_vec()).await.unwrap();

        let past = Utc::now() - ChronoDuration::seconds(10);
        let signature = hmac_sign(b"test-signing-key", &FilesystemStorage::signing_message("job-1/rows.json", past));
        assert!(!storage.verify_signature("job-1/rows.json", past, &signature));
    }

    #[tokio::test]
    async fn tampered_key_fails_verification() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.put("job-1/rows.json", b"[]".to_vec()).await.unwrap();

        let expires = Utc::now() + ChronoDuration::hours(1);
        let signature = hmac_sign(b"test-signing-key", &FilesystemStorage::signing_message("job-1/rows.json", expires));
        assert!(!storage.verify_signature("job-2/rows.json", expires, &signature));
    }
}

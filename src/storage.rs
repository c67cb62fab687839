use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::ImageRef;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload of '{key}' failed: {reason}")]
    Upload { key: String, reason: String },
    #[error("delete of '{key}' failed: {reason}")]
    Delete { key: String, reason: String },
}

// 1. StorageService Contract
/// StorageService
///
/// Opaque blob store for uploaded images. Callers only ever see the returned
/// URL and key; the key is what they hand back to delete the object.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` to provision
    /// the MinIO bucket on startup.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key` and returns where it can be fetched from.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ImageRef, StorageError>;

    /// Removes the object stored under `key`.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;

/// image_key
///
/// Builds a fresh object key (`images/<uuid>.<ext>`) for an upload, keeping the
/// extension of the client's file name when it has a sane one.
pub fn image_key(file_name: Option<&str>) -> String {
    let extension = file_name
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());

    format!("images/{}.{}", Uuid::new_v4(), extension)
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from a key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// `StorageService` backed by the AWS SDK. Path-style addressing keeps it
/// compatible with MinIO as well as S3.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
        }
    }

    /// Public URL of an object under path-style addressing.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket on an existing bucket fails harmlessly.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ImageRef, StorageError> {
        let key = sanitize_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        Ok(ImageRef {
            url: self.object_url(&key),
            key,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let key = sanitize_key(key);

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key,
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests and Local Runs)
/// MockStorageService
///
/// In-memory `StorageService` that records which keys were stored and deleted,
/// so tests can assert on blob cleanup without a network connection.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, uploads fail.
    pub should_fail: bool,
    /// When true, deletions fail (uploads still succeed).
    pub fail_deletes: bool,
    stored: Arc<Mutex<Vec<String>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    /// Keys currently held (stored and not yet deleted).
    pub fn stored_keys(&self) -> Vec<String> {
        self.stored.lock().map(|keys| keys.clone()).unwrap_or_default()
    }

    /// Every key a delete was attempted for, in call order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().map(|keys| keys.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<ImageRef, StorageError> {
        let key = sanitize_key(key);
        if self.should_fail {
            return Err(StorageError::Upload {
                key,
                reason: "mock storage failure".to_string(),
            });
        }

        if let Ok(mut stored) = self.stored.lock() {
            stored.push(key.clone());
        }

        Ok(ImageRef {
            url: format!("http://localhost:9000/mock-bucket/{}", key),
            key,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let key = sanitize_key(key);
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(key.clone());
        }

        if self.fail_deletes {
            return Err(StorageError::Delete {
                key,
                reason: "mock storage failure".to_string(),
            });
        }

        if let Ok(mut stored) = self.stored.lock() {
            stored.retain(|k| *k != key);
        }
        Ok(())
    }
}

//! Remote object store client interface.
//!
//! The reconciler only ever talks to storage through [`ObjectStoreClient`].
//! Implementations: [`StorageService`](super::storage_service::StorageService)
//! (SQLite + disk) and [`InMemoryObjectStore`](super::memory_store::InMemoryObjectStore).

use crate::models::{bucket::LifecycleRule, metadata::Tag};
use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::BTreeMap, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("region `{0}` is not supported")]
    UnsupportedRegion(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A full object write: payload, metadata and tags replace whatever was there.
#[derive(Clone, Debug)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub access_policy: String,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<Tag>,
}

/// Acknowledgement of a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutObjectAck {
    pub etag: String,
}

/// Object description without the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: Option<String>,
    pub access_policy: String,
    pub metadata: BTreeMap<String, String>,
}

/// Identity handles of a created bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketHandle {
    pub name: String,
    pub region: String,
    pub domain_name: String,
    pub regional_domain_name: String,
}

impl BucketHandle {
    /// Derive the S3-style domain names for a bucket.
    pub fn new(name: &str, region: &str) -> Self {
        Self {
            name: name.to_string(),
            region: region.to_string(),
            domain_name: format!("{}.s3.amazonaws.com", name),
            regional_domain_name: format!("{}.s3.{}.amazonaws.com", name, region),
        }
    }
}

/// Operations the reconciler needs from a bucket store.
///
/// Every call is a suspension point with no timeout of its own; callers
/// decide on cancellation.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Create a bucket. Fails with `BucketAlreadyExists` on a name collision.
    async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<BucketHandle>;

    /// Look up an existing bucket.
    async fn head_bucket(&self, name: &str) -> StorageResult<BucketHandle>;

    /// Replace the bucket's lifecycle configuration.
    async fn put_bucket_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> StorageResult<()>;

    /// Write an object, overwriting payload, metadata and tags.
    async fn put_object(&self, request: PutObjectRequest) -> StorageResult<PutObjectAck>;

    /// Physically remove an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Replace an object's tag set, leaving payload and metadata untouched.
    async fn put_object_tagging(&self, bucket: &str, key: &str, tags: &[Tag])
    -> StorageResult<()>;

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> StorageResult<Vec<Tag>>;

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead>;
}

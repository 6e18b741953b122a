//! In-process object store.
//!
//! Keeps buckets and objects in a mutex-guarded map and records every call,
//! so callers can assert which remote operations were issued. Failures can be
//! injected per key or for bucket creation.

use crate::models::{bucket::LifecycleRule, metadata::Tag};
use crate::services::object_store::{
    BucketHandle, ObjectHead, ObjectStoreClient, PutObjectAck, PutObjectRequest, StorageError,
    StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

/// One recorded store call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    CreateBucket { bucket: String },
    PutBucketLifecycle { bucket: String },
    PutObject { bucket: String, key: String },
    DeleteObject { bucket: String, key: String },
    PutObjectTagging { bucket: String, key: String },
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub access_policy: String,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug)]
struct MemoryBucket {
    region: String,
    rules: Vec<LifecycleRule>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: BTreeMap<String, MemoryBucket>,
    calls: Vec<StoreCall>,
    failing_keys: HashSet<String>,
    fail_bucket_creation: bool,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryObjectStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a poisoned map is still structurally valid
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every write to `key` fail with `Unavailable`.
    pub fn fail_key(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    /// Make `create_bucket` fail with `Unavailable`.
    pub fn fail_bucket_creation(&self) {
        self.lock().fail_bucket_creation = true;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn lifecycle_rules(&self, bucket: &str) -> Vec<LifecycleRule> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|b| b.rules.clone())
            .unwrap_or_default()
    }

    fn check_key(inner: &Inner, bucket: &str, key: &str) -> StorageResult<()> {
        if inner.failing_keys.contains(key) {
            return Err(StorageError::Unavailable(format!(
                "injected failure for `{}/{}`",
                bucket, key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectStore {
    async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<BucketHandle> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::CreateBucket {
            bucket: name.to_string(),
        });
        if inner.fail_bucket_creation {
            return Err(StorageError::Unavailable(format!(
                "injected failure creating `{}`",
                name
            )));
        }
        if inner.buckets.contains_key(name) {
            return Err(StorageError::BucketAlreadyExists(name.to_string()));
        }
        inner.buckets.insert(
            name.to_string(),
            MemoryBucket {
                region: region.to_string(),
                rules: Vec::new(),
                objects: BTreeMap::new(),
            },
        );
        Ok(BucketHandle::new(name, region))
    }

    async fn head_bucket(&self, name: &str) -> StorageResult<BucketHandle> {
        let inner = self.lock();
        inner
            .buckets
            .get(name)
            .map(|bucket| BucketHandle::new(name, &bucket.region))
            .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))
    }

    async fn put_bucket_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::PutBucketLifecycle {
            bucket: name.to_string(),
        });
        let bucket = inner
            .buckets
            .get_mut(name)
            .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))?;
        bucket.rules = rules.to_vec();
        Ok(())
    }

    async fn put_object(&self, request: PutObjectRequest) -> StorageResult<PutObjectAck> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::PutObject {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
        });
        Self::check_key(&inner, &request.bucket, &request.key)?;
        let bucket = inner
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| StorageError::BucketNotFound(request.bucket.clone()))?;
        let etag = format!("{:x}", md5::compute(&request.body));
        bucket.objects.insert(
            request.key,
            StoredObject {
                body: request.body,
                content_type: request.content_type,
                access_policy: request.access_policy,
                metadata: request.metadata,
                tags: request.tags,
            },
        );
        Ok(PutObjectAck { etag })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::DeleteObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Self::check_key(&inner, bucket, key)?;
        let stored = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        stored.objects.remove(key);
        Ok(())
    }

    async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tags: &[Tag],
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::PutObjectTagging {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Self::check_key(&inner, bucket, key)?;
        let object = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?
            .objects
            .get_mut(key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        object.tags = tags.to_vec();
        Ok(())
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> StorageResult<Vec<Tag>> {
        self.object(bucket, key)
            .map(|object| object.tags)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        let object = self
            .object(bucket, key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok(ObjectHead {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: Some(object.content_type),
            size_bytes: object.body.len() as i64,
            etag: Some(format!("{:x}", md5::compute(&object.body))),
            access_policy: object.access_policy,
            metadata: object.metadata,
        })
    }
}

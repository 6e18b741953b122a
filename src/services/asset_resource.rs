//! Lazily deleted asset: one local file published as one bucket object.
//!
//! State machine per object key:
//! - absent  -> active   (`create`)
//! - active  -> active   (`diff` finds identical content)
//! - active  -> active'  (`update`, full overwrite; a previous target that
//!   differs from the new one is tagged removed)
//! - active  -> removed  (`delete`, tag mutation only)
//!
//! Nothing here ever erases an object. Objects tagged `removed` are left for
//! the bucket's expiration rule so CDN caches holding old references keep
//! resolving until the retention window runs out.

use crate::errors::{PublishError, PublishResult};
use crate::models::asset::{LifecycleTag, RemoteAssetRecord, UploadDescriptor};
use crate::services::{
    graph::ResourceId,
    integrity::Integrity,
    object_store::{ObjectStoreClient, PutObjectRequest, StorageError},
    provider::{Created, DiffReason, DiffResult, ResourceProvider},
    upload_options::{UploadOptions, build_upload_descriptor, logical_key},
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Desired state of one asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetInputs {
    /// File to publish.
    pub path: PathBuf,

    /// Root the object key is computed from.
    pub root: PathBuf,

    pub bucket: String,
}

impl AssetInputs {
    pub fn key(&self) -> PublishResult<String> {
        logical_key(&self.root, &self.path)
    }
}

/// A declared asset node: its inputs plus the node it must wait for.
#[derive(Clone, Debug)]
pub struct AssetResource {
    pub id: ResourceId,
    pub key: String,
    pub inputs: AssetInputs,
    pub depends_on: ResourceId,
}

/// Provider backing [`AssetResource`] nodes.
#[derive(Clone)]
pub struct AssetProvider {
    store: Arc<dyn ObjectStoreClient>,
    options: UploadOptions,
}

impl AssetProvider {
    pub fn new(store: Arc<dyn ObjectStoreClient>, options: UploadOptions) -> Self {
        Self { store, options }
    }

    async fn descriptor(&self, inputs: &AssetInputs) -> PublishResult<UploadDescriptor> {
        build_upload_descriptor(&inputs.root, &inputs.path, &inputs.bucket, &self.options).await
    }

    /// Write the descriptor as a full object and return the resulting record.
    async fn publish(
        &self,
        descriptor: UploadDescriptor,
        path: &Path,
    ) -> PublishResult<RemoteAssetRecord> {
        let record = RemoteAssetRecord {
            bucket: descriptor.bucket.clone(),
            key: descriptor.key.clone(),
            path: path.to_path_buf(),
            integrity: Some(descriptor.integrity.to_string()),
            lifecycle_tag: descriptor.lifecycle_tag,
        };

        let request = PutObjectRequest {
            bucket: descriptor.bucket.clone(),
            key: descriptor.key.clone(),
            metadata: descriptor.metadata(),
            tags: descriptor.lifecycle_tag.tag_set(),
            content_type: descriptor.content_type,
            access_policy: descriptor.access_policy.as_str().to_string(),
            body: descriptor.body,
        };

        let ack = self
            .store
            .put_object(request)
            .await
            .map_err(|source| PublishError::RemoteStore {
                operation: "put_object",
                bucket: record.bucket.clone(),
                key: record.key.clone(),
                source,
            })?;
        debug!("wrote {}/{} etag={}", record.bucket, record.key, ack.etag);

        Ok(record)
    }

    async fn tag_removed(&self, bucket: &str, key: &str) -> PublishResult<()> {
        self.store
            .put_object_tagging(bucket, key, &LifecycleTag::Removed.tag_set())
            .await
            .map_err(|source| PublishError::RemoteStore {
                operation: "put_object_tagging",
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })
    }
}

#[async_trait]
impl ResourceProvider for AssetProvider {
    type Inputs = AssetInputs;
    type Outputs = RemoteAssetRecord;

    async fn create(&self, inputs: &AssetInputs) -> PublishResult<Created<RemoteAssetRecord>> {
        let descriptor = self.descriptor(inputs).await?;
        let record = self.publish(descriptor, &inputs.path).await?;
        info!("created asset {}/{}", record.bucket, record.key);

        Ok(Created {
            id: record.key.clone(),
            outputs: record,
        })
    }

    async fn diff(
        &self,
        id: &str,
        observed: &RemoteAssetRecord,
        desired: &AssetInputs,
    ) -> PublishResult<DiffResult> {
        let descriptor = self.descriptor(desired).await?;

        if descriptor.bucket != observed.bucket || descriptor.key != observed.key {
            debug!("asset {} moved to {}/{}", id, descriptor.bucket, descriptor.key);
            return Ok(DiffResult::changed(DiffReason::TargetChanged));
        }

        let stored = match observed.integrity.as_deref().map(Integrity::parse) {
            Some(Ok(stored)) => stored,
            Some(Err(err)) => {
                debug!("asset {} has unusable stored digest: {}", id, err);
                return Ok(DiffResult::changed(DiffReason::DigestUnavailable));
            }
            None => return Ok(DiffResult::changed(DiffReason::DigestUnavailable)),
        };

        if stored.matches(&descriptor.integrity) {
            Ok(DiffResult::unchanged())
        } else {
            Ok(DiffResult::changed(DiffReason::ContentChanged))
        }
    }

    async fn update(
        &self,
        id: &str,
        observed: &RemoteAssetRecord,
        desired: &AssetInputs,
    ) -> PublishResult<RemoteAssetRecord> {
        let descriptor = self.descriptor(desired).await?;
        let record = self.publish(descriptor, &desired.path).await?;
        info!("updated asset {} in {}", id, record.bucket);

        if observed.bucket != record.bucket || observed.key != record.key {
            match self.tag_removed(&observed.bucket, &observed.key).await {
                Ok(()) => info!(
                    "tagged previous target {}/{} as removed",
                    observed.bucket, observed.key
                ),
                Err(PublishError::RemoteStore {
                    source: StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. },
                    ..
                }) => warn!(
                    "previous target {}/{} of asset {} is already gone",
                    observed.bucket, observed.key, id
                ),
                Err(err) => return Err(err),
            }
        }
        Ok(record)
    }

    async fn delete(&self, id: &str, observed: &RemoteAssetRecord) -> PublishResult<()> {
        self.tag_removed(&observed.bucket, id).await?;
        info!("tagged asset {}/{} as removed", observed.bucket, id);
        Ok(())
    }
}

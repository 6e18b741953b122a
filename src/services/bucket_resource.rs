//! Lazily deleted bucket: a container owning one bucket and its assets.
//!
//! The container expands its glob once, at plan time, and declares one asset
//! node per match. Every asset node depends on the bucket node, so no asset
//! operation can start before the bucket exists and carries its expiration
//! rule.

use crate::errors::{PublishError, PublishResult};
use crate::models::{
    asset::{DEFAULT_RETENTION_DAYS, LIFECYCLE_TAG_KEY, LifecycleTag},
    bucket::LifecycleRule,
};
use crate::services::{
    asset_resource::{AssetInputs, AssetResource},
    glob::{GlobOptions, expand},
    graph::{ResourceGraph, ResourceId},
    object_store::{BucketHandle, ObjectStoreClient, StorageError},
    state::BucketRecord,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketConfig {
    /// Physical bucket name. Defaults to `<container>-bucket`.
    pub name: Option<String>,
    pub region: String,
    /// Days a `removed` object survives before the backend erases it.
    pub retention_days: i64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: None,
            region: "us-east-1".into(),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Public outputs of a container.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ContainerOutputs {
    pub bucket: String,
    pub bucket_domain_name: String,
    pub bucket_regional_domain_name: String,
    pub assets: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct BucketContainer {
    pub name: String,
    pub bucket_name: String,
    pub region: String,
    pub bucket_id: ResourceId,
    pub root: PathBuf,
    pub lifecycle_rules: Vec<LifecycleRule>,
    pub assets: Vec<AssetResource>,
}

impl BucketContainer {
    /// Declare the bucket and one asset resource per file matched by `patterns`.
    pub fn build(
        name: &str,
        patterns: &[String],
        glob_options: &GlobOptions,
        config: &BucketConfig,
    ) -> PublishResult<Self> {
        let bucket_name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-bucket", name));
        let bucket_id = ResourceId::bucket(name);
        let root = glob_options.root();

        let files = expand(patterns, glob_options)?;
        let assets = files
            .into_iter()
            .map(|file| AssetResource {
                id: ResourceId::asset(&file),
                inputs: AssetInputs {
                    path: root.join(&file),
                    root: root.clone(),
                    bucket: bucket_name.clone(),
                },
                key: file,
                depends_on: bucket_id.clone(),
            })
            .collect::<Vec<_>>();

        info!(
            "container {} declares bucket {} with {} assets",
            name,
            bucket_name,
            assets.len()
        );

        Ok(Self {
            name: name.to_string(),
            bucket_name,
            region: config.region.clone(),
            bucket_id,
            root,
            lifecycle_rules: vec![LifecycleRule::new(
                LIFECYCLE_TAG_KEY,
                LifecycleTag::Removed.as_str(),
                config.retention_days,
            )],
            assets,
        })
    }

    /// The bucket node plus every asset node, each depending on the bucket.
    pub fn graph(&self) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.add_node(self.bucket_id.clone(), []);
        for asset in &self.assets {
            graph.add_node(asset.id.clone(), [asset.depends_on.clone()]);
        }
        graph
    }

    /// Create the bucket when it is not known yet, then apply the lifecycle rule.
    ///
    /// A name collision on first creation is fatal: the bucket belongs to
    /// someone else.
    pub async fn ensure_bucket(
        &self,
        store: &dyn ObjectStoreClient,
        known: Option<&BucketRecord>,
    ) -> PublishResult<BucketRecord> {
        let setup_error = |source: StorageError| PublishError::BucketSetup {
            bucket: self.bucket_name.clone(),
            source,
        };

        let handle = match known.filter(|record| record.name == self.bucket_name) {
            Some(_) => match store.head_bucket(&self.bucket_name).await {
                Ok(handle) => handle,
                Err(StorageError::BucketNotFound(_)) => {
                    info!("bucket {} vanished, recreating", self.bucket_name);
                    store
                        .create_bucket(&self.bucket_name, &self.region)
                        .await
                        .map_err(setup_error)?
                }
                Err(err) => return Err(setup_error(err)),
            },
            None => store
                .create_bucket(&self.bucket_name, &self.region)
                .await
                .map_err(setup_error)?,
        };

        store
            .put_bucket_lifecycle(&handle.name, &self.lifecycle_rules)
            .await
            .map_err(setup_error)?;

        Ok(self.record(handle))
    }

    fn record(&self, handle: BucketHandle) -> BucketRecord {
        BucketRecord {
            name: handle.name,
            region: handle.region,
            domain_name: handle.domain_name,
            regional_domain_name: handle.regional_domain_name,
            lifecycle_rules: self.lifecycle_rules.clone(),
        }
    }

    pub fn outputs(&self, bucket: &BucketRecord) -> ContainerOutputs {
        ContainerOutputs {
            bucket: bucket.name.clone(),
            bucket_domain_name: bucket.domain_name.clone(),
            bucket_regional_domain_name: bucket.regional_domain_name.clone(),
            assets: self.assets.iter().map(|asset| asset.key.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::{InMemoryObjectStore, StoreCall};
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
        std::fs::write(dir.path().join("css").join("app.css"), b"body{}").unwrap();
        dir
    }

    fn glob_options(dir: &TempDir) -> GlobOptions {
        GlobOptions {
            cwd: Some(dir.path().to_path_buf()),
            ..GlobOptions::default()
        }
    }

    #[test]
    fn build_declares_one_asset_per_file() {
        let dir = site();
        let container = BucketContainer::build(
            "site",
            &["**".to_string()],
            &glob_options(&dir),
            &BucketConfig::default(),
        )
        .unwrap();

        let keys: Vec<&str> = container.assets.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["css/app.css", "index.html"]);
        assert_eq!(container.bucket_name, "site-bucket");
        for asset in &container.assets {
            assert_eq!(asset.depends_on, container.bucket_id);
            assert_eq!(asset.inputs.key().unwrap(), asset.key);
        }
        assert_eq!(
            container.lifecycle_rules,
            vec![LifecycleRule::new("AssetActiveState", "removed", 15)]
        );
    }

    #[tokio::test]
    async fn ensure_bucket_creates_and_configures() {
        let dir = site();
        let container = BucketContainer::build(
            "site",
            &["**".to_string()],
            &glob_options(&dir),
            &BucketConfig::default(),
        )
        .unwrap();
        let store = InMemoryObjectStore::new();

        let record = container.ensure_bucket(&store, None).await.unwrap();
        assert_eq!(record.name, "site-bucket");
        assert_eq!(record.regional_domain_name, "site-bucket.s3.us-east-1.amazonaws.com");
        assert_eq!(store.lifecycle_rules("site-bucket"), container.lifecycle_rules);

        // second run with known state only re-applies the lifecycle rule
        container.ensure_bucket(&store, Some(&record)).await.unwrap();
        let creates = store
            .calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::CreateBucket { .. }))
            .count();
        assert_eq!(creates, 1);

        let outputs = container.outputs(&record);
        assert_eq!(outputs.assets, vec!["css/app.css", "index.html"]);
    }

    #[tokio::test]
    async fn name_collision_is_fatal() {
        let dir = site();
        let container = BucketContainer::build(
            "site",
            &["**".to_string()],
            &glob_options(&dir),
            &BucketConfig::default(),
        )
        .unwrap();
        let store = InMemoryObjectStore::new();
        store.create_bucket("site-bucket", "us-east-1").await.unwrap();

        let err = container.ensure_bucket(&store, None).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::BucketSetup {
                source: StorageError::BucketAlreadyExists(_),
                ..
            }
        ));
    }
}

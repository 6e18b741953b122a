//! Persisted observed state between publish runs.
//!
//! Stored as pretty JSON. Writes go to a temporary sibling file first and are
//! renamed into place, so an interrupted run never leaves a truncated file.

use crate::errors::{PublishError, PublishResult};
use crate::models::{asset::RemoteAssetRecord, bucket::LifecycleRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// What we know about the container's bucket.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketRecord {
    pub name: String,
    pub region: String,
    pub domain_name: String,
    pub regional_domain_name: String,
    pub lifecycle_rules: Vec<LifecycleRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentState {
    pub container: String,
    pub bucket: Option<BucketRecord>,

    /// Published assets keyed by logical key.
    #[serde(default)]
    pub assets: BTreeMap<String, RemoteAssetRecord>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeploymentState {
    pub fn empty(container: &str) -> Self {
        Self {
            container: container.to_string(),
            ..Self::default()
        }
    }

    /// Load state from `path`; a missing file yields an empty state.
    pub async fn load(path: &Path, container: &str) -> PublishResult<Self> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no state at {}, starting empty", path.display());
                return Ok(Self::empty(container));
            }
            Err(err) => return Err(state_error(path, err)),
        };

        let state: Self = serde_json::from_slice(&raw).map_err(|err| state_error(path, err))?;
        if state.container != container {
            return Err(PublishError::State {
                path: path.to_path_buf(),
                reason: format!(
                    "belongs to container `{}`, not `{}`",
                    state.container, container
                ),
            });
        }
        Ok(state)
    }

    pub async fn save(&self, path: &Path) -> PublishResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|err| state_error(path, err))?;

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .await
            .map_err(|err| state_error(path, err))?;

        let tmp_path = parent.join(format!(".state-{}", Uuid::new_v4()));
        if let Err(err) = fs::write(&tmp_path, &json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(state_error(path, err));
        }
        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(state_error(path, err));
        }
        debug!("saved state with {} assets to {}", self.assets.len(), path.display());
        Ok(())
    }
}

fn state_error(path: &Path, err: impl std::fmt::Display) -> PublishError {
    PublishError::State {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

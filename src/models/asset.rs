//! Reconciliation-side asset types.
//!
//! A `LocalAsset` is the desired state discovered on disk, an `UploadDescriptor`
//! is what gets written for it, and a `RemoteAssetRecord` is what we remember
//! about the object afterwards.

use crate::models::metadata::Tag;
use crate::services::integrity::Integrity;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

/// Tag key carrying the lifecycle state. Bucket expiration rules filter on it.
pub const LIFECYCLE_TAG_KEY: &str = "AssetActiveState";

/// User metadata key holding the SRI digest of the published content.
pub const INTEGRITY_METADATA_KEY: &str = "integrity";

/// Default retention for objects tagged `removed`.
pub const DEFAULT_RETENTION_DAYS: i64 = 15;

/// Lifecycle state attached to every published object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleTag {
    Active,
    Removed,
}

impl LifecycleTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleTag::Active => "active",
            LifecycleTag::Removed => "removed",
        }
    }

    /// The single-entry tag set written to the store.
    pub fn tag_set(&self) -> Vec<Tag> {
        vec![Tag::new(LIFECYCLE_TAG_KEY, self.as_str())]
    }

    /// Find the lifecycle tag in an arbitrary tag set.
    pub fn from_tags(tags: &[Tag]) -> Option<Self> {
        tags.iter()
            .find(|tag| tag.key == LIFECYCLE_TAG_KEY)
            .and_then(|tag| tag.value.parse().ok())
    }
}

impl fmt::Display for LifecycleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LifecycleTag::Active),
            "removed" => Ok(LifecycleTag::Removed),
            other => Err(format!("unknown lifecycle state `{}`", other)),
        }
    }
}

/// Canned ACL applied to an object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    Private,
    PublicRead,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicy::Private => "private",
            AccessPolicy::PublicRead => "public-read",
        }
    }
}

impl FromStr for AccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(AccessPolicy::Private),
            "public-read" => Ok(AccessPolicy::PublicRead),
            other => Err(format!("unknown access policy `{}`", other)),
        }
    }
}

/// A file discovered under an asset root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalAsset {
    /// Absolute path of the file.
    pub path: PathBuf,

    /// Root the logical key is relative to.
    pub root: PathBuf,

    /// Forward-slash key relative to `root`.
    pub key: String,
}

/// Everything needed to publish one file. Built fresh on every evaluation.
#[derive(Clone, Debug)]
pub struct UploadDescriptor {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub access_policy: AccessPolicy,
    pub integrity: Integrity,
    pub lifecycle_tag: LifecycleTag,
}

impl UploadDescriptor {
    /// User metadata stored alongside the payload.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(INTEGRITY_METADATA_KEY.to_string(), self.integrity.to_string())])
    }
}

/// Observed state of one published object, as remembered between runs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteAssetRecord {
    pub bucket: String,
    pub key: String,

    /// Path the content was read from when last published.
    pub path: PathBuf,

    /// SRI string as persisted; may be missing or malformed in old state.
    #[serde(default)]
    pub integrity: Option<String>,

    pub lifecycle_tag: LifecycleTag,
}

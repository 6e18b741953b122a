//! Represents a bucket and the lifecycle rules attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket in the local backend.
///
/// Buckets act as namespaces for published assets. Each one carries its own
/// lifecycle rules, which the backend enforces during expiration sweeps.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Globally unique bucket name (must conform to DNS naming rules).
    pub name: String,

    /// Region where the bucket is hosted (e.g. "us-west-2").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}

/// Expire objects carrying a given tag after a fixed number of days.
///
/// The day count starts at the moment the object's tag set was last written,
/// so re-tagging an object restarts its retention window.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct LifecycleRule {
    /// Tag key the rule filters on.
    pub tag_key: String,

    /// Tag value the rule filters on.
    pub tag_value: String,

    /// Days after tagging before the object is physically removed.
    pub expiration_days: i64,
}

impl LifecycleRule {
    pub fn new(tag_key: impl Into<String>, tag_value: impl Into<String>, days: i64) -> Self {
        Self {
            tag_key: tag_key.into(),
            tag_value: tag_value.into(),
            expiration_days: days,
        }
    }
}

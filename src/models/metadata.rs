//! Key-value pairs attached to objects: user metadata and tags.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user metadata entry (`x-amz-meta-*` equivalent).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub value: String,
}

/// A single object tag. Tags are replaced as a whole set, never merged.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

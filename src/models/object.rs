//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single object within a bucket.
///
/// The row stores the object's system metadata; user metadata and tags live in
/// their own tables and the payload lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: Option<String>,

    /// Canned ACL the object was written with (e.g. "public-read").
    pub access_policy: String,

    /// Timestamp when the payload was last written.
    pub last_modified: DateTime<Utc>,

    /// Timestamp when the tag set was last replaced.
    pub tags_updated_at: DateTime<Utc>,
}

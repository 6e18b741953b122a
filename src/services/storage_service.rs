//! src/services/storage_service.rs
//!
//! StorageService - the local bucket backend. Metadata, tags and lifecycle
//! rules live in SQLite; payloads live on disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. The service also enforces the
//! lifecycle rules itself through `expire_objects`, the way a hosted store
//! runs its expiration jobs.

use crate::models::{
    bucket::{Bucket, LifecycleRule},
    metadata::{ObjectMetadata, Tag},
    object::Object,
};
use crate::services::object_store::{
    BucketHandle, ObjectHead, ObjectStoreClient, PutObjectAck, PutObjectRequest, StorageError,
    StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const OBJECT_COLUMNS: &str = "id, bucket_id, key, content_type, size_bytes, etag, \
     access_policy, last_modified, tags_updated_at";

#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const SUPPORTED_REGIONS: [&str; 16] = [
    "local",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-2",
    "ap-northeast-3",
    "me-south-1",
];

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject empty, oversized and traversal-prone keys.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        if name.trim() != name {
            return Err(invalid("cannot begin or end with whitespace"));
        }

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    /// Case-insensitive check against SUPPORTED_REGIONS.
    fn ensure_region_valid(&self, region: &str) -> StorageResult<()> {
        if SUPPORTED_REGIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(region))
        {
            Ok(())
        } else {
            Err(StorageError::UnsupportedRegion(region.to_string()))
        }
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket_name);
        path
    }

    /// Two-level shard directories from MD5(bucket/key), reducing files per directory.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {} FROM objects WHERE key = ? AND bucket_id = ?",
            OBJECT_COLUMNS
        ))
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_tags(&self, object: &Object) -> StorageResult<Vec<Tag>> {
        Ok(sqlx::query_as::<_, Tag>(
            "SELECT key, value FROM object_tags WHERE object_id = ? ORDER BY key",
        )
        .bind(object.id)
        .fetch_all(&*self.db)
        .await?)
    }

    async fn fetch_metadata(&self, object: &Object) -> StorageResult<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, ObjectMetadata>(
            "SELECT key, value FROM object_metadata WHERE object_id = ?",
        )
        .bind(object.id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }

    /// Write the payload to a temporary file and rename it into place.
    ///
    /// Returns the hex MD5 of the payload. The temp file is removed on error.
    async fn write_payload(&self, file_path: &Path, body: &[u8]) -> StorageResult<String> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(&tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        Ok(format!("{:x}", md5::compute(body)))
    }

    /// Upload an object with S3 overwrite semantics.
    ///
    /// The payload is written first; the object row is upserted and its
    /// metadata and tags replaced in one transaction.
    pub async fn write_object(&self, request: PutObjectRequest) -> StorageResult<Object> {
        self.ensure_key_safe(&request.key)?;
        let bucket_rec = self.fetch_bucket(&request.bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, &request.key);
        let etag = self.write_payload(&file_path, &request.body).await?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let object = sqlx::query_as::<_, Object>(&format!(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag,
                access_policy, last_modified, tags_updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                access_policy = excluded.access_policy,
                last_modified = excluded.last_modified,
                tags_updated_at = excluded.tags_updated_at
            RETURNING {}
            "#,
            OBJECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(&request.key)
        .bind(&request.content_type)
        .bind(request.body.len() as i64)
        .bind(&etag)
        .bind(&request.access_policy)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        for (key, value) in &request.metadata {
            sqlx::query("INSERT INTO object_metadata (object_id, key, value) VALUES (?, ?, ?)")
                .bind(object.id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM object_tags WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        for tag in &request.tags {
            sqlx::query("INSERT INTO object_tags (object_id, key, value) VALUES (?, ?, ?)")
                .bind(object.id)
                .bind(&tag.key)
                .bind(&tag.value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(
            "stored {}/{} ({} bytes)",
            bucket_rec.name, request.key, object.size_bytes
        );
        Ok(object)
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata, tags and an opened File handle ready for streaming out.
    /// Returns ObjectNotFound if metadata exists but physical file is missing.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, Vec<Tag>, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;
        let tags = self.fetch_tags(&object).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, tags, file))
    }

    /// Remove an object row and its payload, then prune empty shard directories.
    pub async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let mut tx = self.db.begin().await?;
        for table in ["object_metadata", "object_tags"] {
            sqlx::query(&format!("DELETE FROM {} WHERE object_id = ?", table))
                .bind(object.id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM objects WHERE id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(object)
    }

    /// Create a bucket and initialize its directory.
    ///
    /// Validates name and region. Returns BucketAlreadyExists on a name conflict.
    pub async fn insert_bucket(&self, name: &str, region: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        let normalized_region = region.to_lowercase();
        self.ensure_region_valid(&normalized_region)?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            region: normalized_region,
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(&bucket.region)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::BucketAlreadyExists(name.to_string()));
            }
            Err(err) => return Err(StorageError::Sqlx(err)),
        }

        fs::create_dir_all(self.bucket_root(name)).await?;
        info!("created bucket {} in {}", bucket.name, bucket.region);
        Ok(bucket)
    }

    pub async fn lifecycle_rules(&self, bucket: &str) -> StorageResult<Vec<LifecycleRule>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        Ok(sqlx::query_as::<_, LifecycleRule>(
            "SELECT tag_key, tag_value, expiration_days FROM bucket_lifecycle_rules
             WHERE bucket_id = ? ORDER BY tag_key, tag_value",
        )
        .bind(bucket_rec.id)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Hard-delete every object whose tags match one of its bucket's lifecycle
    /// rules and whose tag set was last written more than the rule's
    /// expiration window before `now`.
    ///
    /// Returns the `(bucket, key)` pairs that were removed.
    pub async fn expire_objects(&self, now: DateTime<Utc>) -> StorageResult<Vec<(String, String)>> {
        let buckets = sqlx::query_as::<_, Bucket>(
            "SELECT id, name, region, created_at FROM buckets ORDER BY name",
        )
        .fetch_all(&*self.db)
        .await?;

        let mut expired = Vec::new();
        for bucket in buckets {
            for rule in self.lifecycle_rules(&bucket.name).await? {
                let cutoff = now - Duration::days(rule.expiration_days);
                let candidates = sqlx::query_as::<_, Object>(&format!(
                    "SELECT {} FROM objects WHERE bucket_id = ? AND id IN (
                         SELECT object_id FROM object_tags WHERE key = ? AND value = ?
                     ) ORDER BY key",
                    OBJECT_COLUMNS
                ))
                .bind(bucket.id)
                .bind(&rule.tag_key)
                .bind(&rule.tag_value)
                .fetch_all(&*self.db)
                .await?;

                for object in candidates {
                    if object.tags_updated_at > cutoff {
                        continue;
                    }
                    match self.remove_object(&bucket.name, &object.key).await {
                        Ok(_) => {
                            info!(
                                "expired {}/{} ({}={} for {} days)",
                                bucket.name,
                                object.key,
                                rule.tag_key,
                                rule.tag_value,
                                rule.expiration_days
                            );
                            expired.push((bucket.name.clone(), object.key));
                        }
                        // another rule of this sweep got there first
                        Err(StorageError::ObjectNotFound { .. }) => {}
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        Ok(expired)
    }

    /// Recursively remove empty directories up to bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStoreClient for StorageService {
    async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<BucketHandle> {
        let bucket = self.insert_bucket(name, region).await?;
        Ok(BucketHandle::new(&bucket.name, &bucket.region))
    }

    async fn head_bucket(&self, name: &str) -> StorageResult<BucketHandle> {
        let bucket = self.fetch_bucket(name).await?;
        Ok(BucketHandle::new(&bucket.name, &bucket.region))
    }

    async fn put_bucket_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> StorageResult<()> {
        let bucket = self.fetch_bucket(name).await?;
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM bucket_lifecycle_rules WHERE bucket_id = ?")
            .bind(bucket.id)
            .execute(&mut *tx)
            .await?;
        for rule in rules {
            sqlx::query(
                "INSERT INTO bucket_lifecycle_rules (bucket_id, tag_key, tag_value, expiration_days)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(bucket.id)
            .bind(&rule.tag_key)
            .bind(&rule.tag_value)
            .bind(rule.expiration_days)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn put_object(&self, request: PutObjectRequest) -> StorageResult<PutObjectAck> {
        let object = self.write_object(request).await?;
        Ok(PutObjectAck {
            etag: object.etag.unwrap_or_default(),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.remove_object(bucket, key).await.map(|_| ())
    }

    async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tags: &[Tag],
    ) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM object_tags WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        for tag in tags {
            sqlx::query("INSERT INTO object_tags (object_id, key, value) VALUES (?, ?, ?)")
                .bind(object.id)
                .bind(&tag.key)
                .bind(&tag.value)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE objects SET tags_updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> StorageResult<Vec<Tag>> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;
        self.fetch_tags(&object).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;
        let metadata = self.fetch_metadata(&object).await?;
        Ok(ObjectHead {
            bucket: bucket_rec.name,
            key: object.key,
            content_type: object.content_type,
            size_bytes: object.size_bytes,
            etag: object.etag,
            access_policy: object.access_policy,
            metadata,
        })
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn service(dir: &TempDir) -> StorageService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let service = StorageService::new(Arc::new(pool), dir.path().join("objects"));
        service.migrate().await.unwrap();
        service
    }

    #[tokio::test]
    async fn bucket_names_follow_s3_rules() {
        let pool = SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        let service = StorageService::new(Arc::new(pool), "/tmp/unused");
        assert!(service.ensure_bucket_name_safe("site-static").is_ok());
        assert!(service.ensure_bucket_name_safe("ab").is_err());
        assert!(service.ensure_bucket_name_safe("Site").is_err());
        assert!(service.ensure_bucket_name_safe("-site").is_err());
        assert!(service.ensure_bucket_name_safe("a..b").is_err());
        assert!(service.ensure_bucket_name_safe("10.0.0.1").is_err());
    }

    #[tokio::test]
    async fn keys_cannot_escape_bucket() {
        let pool = SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        let service = StorageService::new(Arc::new(pool), "/tmp/unused");
        assert!(service.ensure_key_safe("css/app.css").is_ok());
        assert!(service.ensure_key_safe("app..min.js").is_ok());
        assert!(service.ensure_key_safe("../etc/passwd").is_err());
        assert!(service.ensure_key_safe("/abs").is_err());
        assert!(service.ensure_key_safe("").is_err());
    }

    #[tokio::test]
    async fn retagging_keeps_payload_and_metadata() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        service.create_bucket("site-static", "us-east-1").await.unwrap();

        let request = PutObjectRequest {
            bucket: "site-static".into(),
            key: "js/app.js".into(),
            body: bytes::Bytes::from_static(b"console.log(1)"),
            content_type: "application/javascript".into(),
            access_policy: "public-read".into(),
            metadata: BTreeMap::from([("integrity".to_string(), "sha512-abc".to_string())]),
            tags: vec![Tag::new("AssetActiveState", "active")],
        };
        service.put_object(request).await.unwrap();
        service
            .put_object_tagging(
                "site-static",
                "js/app.js",
                &[Tag::new("AssetActiveState", "removed")],
            )
            .await
            .unwrap();

        let head = service.head_object("site-static", "js/app.js").await.unwrap();
        assert_eq!(head.metadata.get("integrity").map(String::as_str), Some("sha512-abc"));
        assert_eq!(head.size_bytes, 14);

        let (_, tags, _) = service
            .get_object_reader("site-static", "js/app.js")
            .await
            .unwrap();
        assert_eq!(tags, vec![Tag::new("AssetActiveState", "removed")]);
    }

    #[tokio::test]
    async fn duplicate_bucket_is_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        service.create_bucket("site-static", "local").await.unwrap();

        let err = service.create_bucket("site-static", "local").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketAlreadyExists(_)));
    }
}

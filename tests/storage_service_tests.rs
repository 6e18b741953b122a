use asset_publisher::models::{
    asset::{INTEGRITY_METADATA_KEY, LIFECYCLE_TAG_KEY, LifecycleTag},
    bucket::LifecycleRule,
    metadata::Tag,
};
use asset_publisher::services::{
    asset_resource::AssetProvider,
    bucket_resource::{BucketConfig, BucketContainer},
    glob::GlobOptions,
    object_store::{ObjectStoreClient, PutObjectRequest, StorageError},
    reconciler::{AssetAction, ReconcileOptions, Reconciler},
    state::DeploymentState,
    storage_service::StorageService,
    upload_options::UploadOptions,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::{collections::BTreeMap, fs, sync::Arc};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

async fn storage(dir: &TempDir) -> StorageService {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let service = StorageService::new(Arc::new(pool), dir.path().join("objects"));
    service.migrate().await.unwrap();
    service
}

fn request(bucket: &str, key: &str, body: &'static [u8], tag: LifecycleTag) -> PutObjectRequest {
    PutObjectRequest {
        bucket: bucket.into(),
        key: key.into(),
        body: Bytes::from_static(body),
        content_type: "text/plain; charset=utf-8".into(),
        access_policy: "public-read".into(),
        metadata: BTreeMap::new(),
        tags: tag.tag_set(),
    }
}

async fn read_body(service: &StorageService, bucket: &str, key: &str) -> Vec<u8> {
    let (_, _, mut file) = service.get_object_reader(bucket, key).await.unwrap();
    let mut body = Vec::new();
    file.read_to_end(&mut body).await.unwrap();
    body
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;
    service.migrate().await.unwrap();
}

#[tokio::test]
async fn publish_through_local_backend() {
    let site = TempDir::new().unwrap();
    fs::create_dir_all(site.path().join("css")).unwrap();
    fs::write(site.path().join("index.html"), b"<html></html>").unwrap();
    fs::write(site.path().join("css").join("app.css"), b"body{}").unwrap();

    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;
    let store: Arc<dyn ObjectStoreClient> = Arc::new(service.clone());

    let container = BucketContainer::build(
        "site",
        &["**".to_string()],
        &GlobOptions {
            cwd: Some(site.path().to_path_buf()),
            ..GlobOptions::default()
        },
        &BucketConfig {
            name: Some("site-static".into()),
            ..BucketConfig::default()
        },
    )
    .unwrap();
    let reconciler = Reconciler::new(
        store.clone(),
        AssetProvider::new(store, UploadOptions::default()),
        ReconcileOptions::default(),
    );
    let mut state = DeploymentState::empty("site");
    let plan = reconciler.plan(&container, &state);
    let report = reconciler.apply(&container, plan, &mut state).await.unwrap();
    assert!(report.is_success(), "{:?}", report);

    let head = service.head_object("site-static", "css/app.css").await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("text/css; charset=utf-8"));
    assert!(head.metadata[INTEGRITY_METADATA_KEY].starts_with("sha512-"));
    assert_eq!(
        service.lifecycle_rules("site-static").await.unwrap(),
        vec![LifecycleRule::new(LIFECYCLE_TAG_KEY, "removed", 15)]
    );

    // removing a source only retags the object
    fs::remove_file(site.path().join("css").join("app.css")).unwrap();
    let container = BucketContainer::build(
        "site",
        &["**".to_string()],
        &GlobOptions {
            cwd: Some(site.path().to_path_buf()),
            ..GlobOptions::default()
        },
        &BucketConfig {
            name: Some("site-static".into()),
            ..BucketConfig::default()
        },
    )
    .unwrap();
    let plan = reconciler.plan(&container, &state);
    let report = reconciler.apply(&container, plan, &mut state).await.unwrap();
    assert_eq!(report.count(AssetAction::Delete), 1);

    let tags = service
        .get_object_tagging("site-static", "css/app.css")
        .await
        .unwrap();
    assert_eq!(tags, LifecycleTag::Removed.tag_set());
    assert_eq!(read_body(&service, "site-static", "css/app.css").await, b"body{}");
}

#[tokio::test]
async fn expiration_only_removes_tagged_objects_past_retention() {
    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;
    service.create_bucket("site-static", "us-east-1").await.unwrap();
    service
        .put_bucket_lifecycle(
            "site-static",
            &[LifecycleRule::new(LIFECYCLE_TAG_KEY, "removed", 15)],
        )
        .await
        .unwrap();

    service
        .put_object(request("site-static", "keep.js", b"keep", LifecycleTag::Active))
        .await
        .unwrap();
    service
        .put_object(request("site-static", "old.js", b"old", LifecycleTag::Active))
        .await
        .unwrap();
    service
        .put_object_tagging("site-static", "old.js", &LifecycleTag::Removed.tag_set())
        .await
        .unwrap();

    let now = Utc::now();
    assert!(service.expire_objects(now).await.unwrap().is_empty());
    assert!(
        service
            .expire_objects(now + Duration::days(14))
            .await
            .unwrap()
            .is_empty()
    );

    let expired = service.expire_objects(now + Duration::days(16)).await.unwrap();
    assert_eq!(expired, vec![("site-static".to_string(), "old.js".to_string())]);

    let err = service
        .get_object_reader("site-static", "old.js")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    assert_eq!(read_body(&service, "site-static", "keep.js").await, b"keep");
}

#[tokio::test]
async fn overwrite_replaces_tags_and_metadata() {
    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;
    service.create_bucket("site-static", "local").await.unwrap();

    let mut first = request("site-static", "app.js", b"v1", LifecycleTag::Removed);
    first
        .metadata
        .insert(INTEGRITY_METADATA_KEY.into(), "sha512-one".into());
    service.put_object(first).await.unwrap();

    let mut second = request("site-static", "app.js", b"v2-longer", LifecycleTag::Active);
    second
        .metadata
        .insert(INTEGRITY_METADATA_KEY.into(), "sha512-two".into());
    let ack = service.put_object(second).await.unwrap();

    let head = service.head_object("site-static", "app.js").await.unwrap();
    assert_eq!(head.size_bytes, 9);
    assert_eq!(head.etag.as_deref(), Some(ack.etag.as_str()));
    assert_eq!(head.metadata[INTEGRITY_METADATA_KEY], "sha512-two");
    assert_eq!(
        service.get_object_tagging("site-static", "app.js").await.unwrap(),
        vec![Tag::new(LIFECYCLE_TAG_KEY, "active")]
    );
}

#[tokio::test]
async fn writes_to_missing_bucket_fail() {
    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;

    let err = service
        .put_object(request("nowhere", "a.txt", b"a", LifecycleTag::Active))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)));

    let err = service.head_bucket("nowhere").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)));
}

#[tokio::test]
async fn unsupported_region_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;

    let err = service
        .create_bucket("site-static", "mars-north-1")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedRegion(_)));
}

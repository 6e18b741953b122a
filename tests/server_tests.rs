use asset_publisher::{
    config::{AppConfig, Mode},
    models::asset::LifecycleTag,
    routes::routes::{AppState, routes},
    services::{
        edge::{AssetManifest, ClientBundle, DEFAULT_RENDER_ROUTE, EdgeHandler, ShellRenderer},
        object_store::{ObjectStoreClient, PutObjectRequest},
        storage_service::StorageService,
    },
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use bytes::Bytes;
use sqlx::sqlite::SqlitePoolOptions;
use std::{collections::BTreeMap, fs, path::Path, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

const BUCKET: &str = "site-static";

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

async fn put(service: &StorageService, key: &str, body: &'static [u8], tag: LifecycleTag) {
    service
        .put_object(PutObjectRequest {
            bucket: BUCKET.into(),
            key: key.into(),
            body: Bytes::from_static(body),
            content_type: "application/javascript; charset=utf-8".into(),
            access_policy: "public-read".into(),
            metadata: BTreeMap::new(),
            tags: tag.tag_set(),
        })
        .await
        .unwrap();
}

fn manifest() -> AssetManifest {
    AssetManifest {
        client: ClientBundle {
            css: None,
            js: Some("/static/js/bundle.js".into()),
        },
    }
}

fn app(storage: StorageService, cfg: AppConfig) -> Router {
    let edge = EdgeHandler::new(
        cfg.render_route.clone(),
        manifest(),
        cfg.mode,
        Arc::new(ShellRenderer::default()),
    );
    routes().with_state(AppState::new(storage, edge, &cfg))
}

async fn production(dir: &TempDir) -> Router {
    let service = storage(dir).await;
    service.create_bucket(BUCKET, "us-east-1").await.unwrap();
    put(&service, "static/js/bundle.js", b"console.log(1)", LifecycleTag::Active).await;
    put(&service, "static/js/old.js", b"console.log(0)", LifecycleTag::Removed).await;
    app(
        service,
        AppConfig {
            mode: Mode::Production,
            bucket: Some(BUCKET.into()),
            ..AppConfig::default()
        },
    )
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, header::HeaderMap, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn healthz_is_ok() {
    let dir = TempDir::new().unwrap();
    let (status, _, body) = send(production(&dir).await, Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"ok\""));
}

#[tokio::test]
async fn readyz_checks_the_origin_bucket() {
    let dir = TempDir::new().unwrap();
    let (status, _, body) = send(production(&dir).await, Method::GET, "/readyz").await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let other = TempDir::new().unwrap();
    let service = storage(&other).await;
    service.create_bucket("another-one", "local").await.unwrap();
    let unconfigured = app(
        service,
        AppConfig {
            bucket: Some(BUCKET.into()),
            ..AppConfig::default()
        },
    );
    let (status, _, body) = send(unconfigured, Method::GET, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("origin"));
}

#[tokio::test]
async fn render_route_is_answered_at_the_edge() {
    let dir = TempDir::new().unwrap();
    let (status, headers, body) =
        send(production(&dir).await, Method::GET, DEFAULT_RENDER_ROUTE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
    assert!(body.starts_with("<!doctype html>"));
    assert!(body.contains(r#"<script src="/static/js/bundle.js" defer></script>"#));
}

#[tokio::test]
async fn other_paths_pass_through_to_the_bucket() {
    let dir = TempDir::new().unwrap();
    let (status, headers, body) =
        send(production(&dir).await, Method::GET, "/static/js/bundle.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "console.log(1)");
    assert_eq!(headers["x-asset-state"], "active");
    assert!(headers.contains_key(header::ETAG));
}

#[tokio::test]
async fn removed_assets_are_still_served() {
    let dir = TempDir::new().unwrap();
    let (status, headers, body) =
        send(production(&dir).await, Method::GET, "/static/js/old.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "console.log(0)");
    assert_eq!(headers["x-asset-state"], "removed");
}

#[tokio::test]
async fn head_returns_headers_without_body() {
    let dir = TempDir::new().unwrap();
    let (status, headers, body) =
        send(production(&dir).await, Method::HEAD, "/static/js/bundle.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_LENGTH], "14");
    assert!(body.is_empty());
}

#[tokio::test]
async fn missing_assets_are_not_found() {
    let dir = TempDir::new().unwrap();
    let (status, _, body) = send(production(&dir).await, Method::GET, "/nope.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("404"));
}

#[tokio::test]
async fn encoded_paths_resolve_to_decoded_keys() {
    let dir = TempDir::new().unwrap();
    let service = storage(&dir).await;
    service.create_bucket(BUCKET, "us-east-1").await.unwrap();
    put(&service, "fonts/my font.woff2", b"wOF2", LifecycleTag::Active).await;
    let router = app(
        service,
        AppConfig {
            mode: Mode::Production,
            bucket: Some(BUCKET.into()),
            ..AppConfig::default()
        },
    );

    let (status, headers, body) =
        send(router.clone(), Method::GET, "/fonts/my%20font.woff2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "wOF2");
    assert_eq!(headers["x-asset-state"], "active");

    let (status, _, _) = send(router, Method::GET, "/fonts/bad%FF.woff2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn writes_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (status, _, _) = send(production(&dir).await, Method::POST, "/render").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

async fn development(dir: &TempDir, public_dir: &Path) -> Router {
    app(
        storage(dir).await,
        AppConfig {
            mode: Mode::Development,
            public_dir: public_dir.to_path_buf(),
            ..AppConfig::default()
        },
    )
}

#[tokio::test]
async fn development_serves_public_dir_then_shell() {
    let dir = TempDir::new().unwrap();
    let public = TempDir::new().unwrap();
    fs::create_dir_all(public.path().join("static")).unwrap();
    fs::write(public.path().join("static").join("app.css"), b"body{}").unwrap();

    let (status, headers, body) = send(
        development(&dir, public.path()).await,
        Method::GET,
        "/static/app.css",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "body{}");
    assert_eq!(headers[header::CONTENT_TYPE], "text/css; charset=utf-8");

    fs::write(public.path().join("static").join("my file.txt"), b"spaced").unwrap();
    let (status, _, body) = send(
        development(&dir, public.path()).await,
        Method::GET,
        "/static/my%20file.txt",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "spaced");

    let (status, _, body) = send(
        development(&dir, public.path()).await,
        Method::GET,
        "/some/client/route",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("defer crossorigin"));
}

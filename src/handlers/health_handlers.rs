//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity, disk I/O and
//!   that the configured origin can be served

use crate::{
    config::Mode, handlers::asset_handlers::public_dir_ready, routes::routes::AppState,
    services::object_store::ObjectStoreClient,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Always 200 with a small JSON body. Performs no I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness check that:
/// 1. Runs `SELECT 1` against SQLite.
/// 2. Writes, reads back and deletes a temp file under the storage `base_path`.
/// 3. Checks the origin: the configured bucket in production, `public_dir`
///    in development.
///
/// HTTP 200 when all checks pass, HTTP 503 otherwise.
pub async fn readyz(State(app): State<AppState>) -> impl IntoResponse {
    let service = &app.storage;
    let mut checks = BTreeMap::new();

    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };
    checks.insert("sqlite", sqlite);

    let tmp_path = service
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let disk = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => {
            let read = fs::read(&tmp_path).await;
            let removed = fs::remove_file(&tmp_path).await;
            match (read, removed) {
                (Ok(bytes), Ok(_)) if bytes == b"readyz" => CheckStatus::ok(),
                (Ok(bytes), Err(e)) if bytes == b"readyz" => CheckStatus {
                    ok: true,
                    error: Some(format!("could not remove tmp file: {}", e)),
                },
                (Ok(_), _) => CheckStatus::failed("file content mismatch"),
                (Err(e), _) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
            }
        }
        Err(e) => CheckStatus::failed(format!("could not write tmp file: {}", e)),
    };
    checks.insert("disk", disk);

    let origin = match (app.mode, app.bucket.as_deref()) {
        (Mode::Production, Some(bucket)) => match service.head_bucket(bucket).await {
            Ok(_) => CheckStatus::ok(),
            Err(e) => CheckStatus::failed(e.to_string()),
        },
        (Mode::Production, None) => CheckStatus::failed("no bucket configured"),
        (Mode::Development, _) => {
            if public_dir_ready(&app.public_dir).await {
                CheckStatus::ok()
            } else {
                CheckStatus::failed(format!("{} is not a directory", app.public_dir.display()))
            }
        }
    };
    checks.insert("origin", origin);

    let overall_ok = checks.values().all(|check| check.ok);
    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

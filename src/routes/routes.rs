//! Defines the routes of the asset server.
//!
//! ## Structure
//! - `GET /healthz` - liveness
//! - `GET /readyz`  - readiness (SQLite, disk, origin)
//! - everything else - `serve_asset`, which goes through the edge handler in
//!   production and through `public_dir` in development
//!
//! The catch-all is a fallback so nested keys like `static/js/app.js` need no
//! wildcard route.

use crate::{
    config::{AppConfig, Mode},
    handlers::{
        asset_handlers::serve_asset,
        health_handlers::{healthz, readyz},
    },
    services::{edge::EdgeHandler, storage_service::StorageService},
};
use axum::{Router, routing::get};
use std::path::PathBuf;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub edge: EdgeHandler,
    pub mode: Mode,
    /// Origin bucket for pass-through requests.
    pub bucket: Option<String>,
    pub public_dir: PathBuf,
}

impl AppState {
    pub fn new(storage: StorageService, edge: EdgeHandler, cfg: &AppConfig) -> Self {
        Self {
            storage,
            edge,
            mode: cfg.mode,
            bucket: cfg.bucket.clone(),
            public_dir: cfg.public_dir.clone(),
        }
    }
}

/// Build the router. The returned router still needs `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(serve_asset)
}

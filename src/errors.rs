use crate::services::object_store::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Failures while reconciling assets against a bucket.
///
/// Every variant names the asset key or bucket involved so a failed run
/// reports which file broke and why.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("asset `{key}`: source file {} is unavailable: {source}", .path.display())]
    SourceUnavailable {
        key: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("asset `{key}`: {operation} on bucket `{bucket}` failed: {source}")]
    RemoteStore {
        operation: &'static str,
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("path {} is outside asset root {}", .path.display(), .root.display())]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("invalid glob pattern `{pattern}`: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("cannot read {} while expanding globs: {source}", .path.display())]
    GlobWalk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("bucket `{bucket}` setup failed: {source}")]
    BucketSetup {
        bucket: String,
        #[source]
        source: StorageError,
    },

    #[error("resource graph: {0}")]
    Graph(String),

    #[error("state file {}: {reason}", .path.display())]
    State { path: PathBuf, reason: String },
}

pub type PublishResult<T> = Result<T, PublishError>;

/// A lightweight wrapper for HTTP-facing errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::InvalidObjectKey(_) | StorageError::InvalidBucketName { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

//! HTTP handlers serving published assets.
//!
//! Production mode puts the edge handler in front of the bucket: the render
//! route is answered with the HTML document, every other request is served
//! from the bucket. Development mode serves `public_dir` directly and falls
//! back to the document for any path that is not a file.
//! Bodies are streamed from disk rather than buffered.

use crate::{
    config::Mode,
    errors::AppError,
    models::{asset::LifecycleTag, object::Object},
    routes::routes::AppState,
    services::{
        edge::{EdgeRequest, EdgeResult},
        upload_options::content_type_for,
    },
};
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::debug;

const ASSET_STATE_HEADER: HeaderName = HeaderName::from_static("x-asset-state");
const MAX_EDGE_BODY: usize = 1024 * 1024;
const INDEX_KEY: &str = "index.html";

/// Catch-all `GET`/`HEAD` handler.
pub async fn serve_asset(
    State(app): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let method = request.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{} is not supported", method),
        ));
    }

    match app.mode {
        Mode::Production => serve_from_edge(&app, request).await,
        Mode::Development => {
            let location = decoded_path(request.uri().path())?;
            serve_from_public_dir(&app, &location, &method).await
        }
    }
}

async fn serve_from_edge(app: &AppState, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_EDGE_BODY)
        .await
        .map_err(|err| AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string()))?;
    let edge_request = EdgeRequest {
        uri: parts.uri,
        method: parts.method,
        headers: parts.headers,
        body,
    };

    match app.edge.handle(edge_request) {
        EdgeResult::Respond(rendered) => {
            let status = StatusCode::from_u16(rendered.status)
                .map_err(|err| AppError::internal(err.to_string()))?;
            Ok(html_response(status, rendered.body))
        }
        EdgeResult::PassThrough(forwarded) => {
            let bucket = app
                .bucket
                .as_deref()
                .ok_or_else(|| AppError::not_found("no bucket configured"))?;
            let key = object_key(&decoded_path(forwarded.uri.path())?);
            get_object(app, bucket, &key, &forwarded.method).await
        }
    }
}

/// Stream `bucket/key`. Objects already marked removed are still served.
async fn get_object(
    app: &AppState,
    bucket: &str,
    key: &str,
    method: &Method,
) -> Result<Response, AppError> {
    let (meta, tags, file) = app.storage.get_object_reader(bucket, key).await?;
    let state = LifecycleTag::from_tags(&tags);

    let mut response = streamed(file, method);
    set_object_headers(response.headers_mut(), &meta);
    if let Some(state) = state {
        response
            .headers_mut()
            .insert(ASSET_STATE_HEADER, HeaderValue::from_static(state.as_str()));
        if state == LifecycleTag::Removed {
            debug!("serving removed asset {}/{}", bucket, key);
        }
    }
    Ok(response)
}

async fn serve_from_public_dir(
    app: &AppState,
    location: &str,
    method: &Method,
) -> Result<Response, AppError> {
    if let Some(path) = public_file(&app.public_dir, location) {
        if let Ok(file) = File::open(&path).await {
            let metadata = file.metadata().await?;
            if metadata.is_file() {
                let mut response = streamed(file, method);
                let headers = response.headers_mut();
                let content_type = content_type_for(location).unwrap_or("application/octet-stream");
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
                return Ok(response);
            }
        }
    }

    Ok(html_response(StatusCode::OK, app.edge.document(location)))
}

fn streamed(file: File, method: &Method) -> Response {
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response
}

fn html_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Percent-decode a request path. Keys and file names are matched decoded.
fn decoded_path(path: &str) -> Result<String, AppError> {
    percent_decode_str(path)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| AppError::new(StatusCode::BAD_REQUEST, "request path is not valid UTF-8"))
}

/// Map a request path to an object key; `/` and trailing slashes map to `index.html`.
fn object_key(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        format!("{}{}", trimmed, INDEX_KEY)
    } else {
        trimmed.to_string()
    }
}

/// Resolve `location` under `root`, refusing anything but plain segments.
fn public_file(root: &Path, location: &str) -> Option<PathBuf> {
    let relative = Path::new(location.trim_start_matches('/'));
    if relative.as_os_str().is_empty() {
        return None;
    }
    let mut path = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => path.push(segment),
            _ => return None,
        }
    }
    Some(path)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0)),
    );

    if let Some(etag) = meta.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// Whether `dir` exists; used by readiness in development mode.
pub async fn public_dir_ready(dir: &Path) -> bool {
    fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false)
}

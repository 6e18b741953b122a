//! Edge request handling and the HTML document shell.
//!
//! The edge handler sits in front of the bucket: every request except the
//! render route passes through untouched to the origin, the render route is
//! answered directly with a rendered document.

use crate::config::Mode;
use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use serde::Deserialize;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::fs;
use tracing::debug;

pub const DEFAULT_RENDER_ROUTE: &str = "/render";

/// Client bundle locations emitted by the frontend build.
///
/// Mirrors the `{ "client": { "css": ..., "js": ... } }` manifest layout.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetManifest {
    #[serde(default)]
    pub client: ClientBundle,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientBundle {
    pub css: Option<String>,
    pub js: Option<String>,
}

impl AssetManifest {
    /// Read a manifest file. A missing file yields an empty manifest.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        match fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no asset manifest at {}", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err),
        }
    }
}

/// Produces the markup placed inside the document's root element.
pub trait PageRenderer: Send + Sync {
    fn title(&self) -> String;
    fn render(&self, location: &str) -> String;
}

/// Renders an empty mount point; the client bundle takes over in the browser.
#[derive(Clone, Debug)]
pub struct ShellRenderer {
    pub title: String,
}

impl Default for ShellRenderer {
    fn default() -> Self {
        Self {
            title: "Asset Publisher".into(),
        }
    }
}

impl PageRenderer for ShellRenderer {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn render(&self, _location: &str) -> String {
        String::new()
    }
}

/// Wrap rendered markup in the full HTML document.
pub fn render_document(markup: &str, title: &str, manifest: &AssetManifest, mode: Mode) -> String {
    let stylesheet = manifest
        .client
        .css
        .as_deref()
        .map(|href| format!(r#"<link rel="stylesheet" href="{}">"#, html_escape(href)))
        .unwrap_or_default();
    let script = manifest
        .client
        .js
        .as_deref()
        .map(|src| match mode {
            Mode::Production => format!(r#"<script src="{}" defer></script>"#, html_escape(src)),
            Mode::Development => format!(
                r#"<script src="{}" defer crossorigin></script>"#,
                html_escape(src)
            ),
        })
        .unwrap_or_default();

    format!(
        concat!(
            "<!doctype html>\n",
            "<html>\n",
            "<head>\n",
            r#"    <meta http-equiv="X-UA-Compatible" content="IE=edge" />"#,
            "\n",
            r#"    <meta charSet='utf-8' />"#,
            "\n",
            r#"    <meta name="viewport" content="width=device-width, initial-scale=1">"#,
            "\n",
            "    <title>{}</title>\n",
            "    {}\n",
            "    {}\n",
            "</head>\n",
            "<body>\n",
            r#"    <div id="root">{}</div>"#,
            "\n",
            "</body>\n",
            "</html>"
        ),
        html_escape(title),
        stylesheet,
        script,
        markup
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Clone, Debug)]
pub struct EdgeRequest {
    pub uri: Uri,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Clone, Debug)]
pub enum EdgeResult {
    /// Forward the request, unchanged, to the origin.
    PassThrough(EdgeRequest),
    Respond(EdgeResponse),
}

#[derive(Clone)]
pub struct EdgeHandler {
    render_route: String,
    manifest: AssetManifest,
    mode: Mode,
    renderer: Arc<dyn PageRenderer>,
}

impl EdgeHandler {
    pub fn new(
        render_route: impl Into<String>,
        manifest: AssetManifest,
        mode: Mode,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self {
            render_route: render_route.into(),
            manifest,
            mode,
            renderer,
        }
    }

    pub fn render_route(&self) -> &str {
        &self.render_route
    }

    /// Render the document for `location`.
    pub fn document(&self, location: &str) -> String {
        render_document(
            &self.renderer.render(location),
            &self.renderer.title(),
            &self.manifest,
            self.mode,
        )
    }

    /// Only the exact render path is answered here; query strings do not
    /// affect the match.
    pub fn handle(&self, request: EdgeRequest) -> EdgeResult {
        if request.uri.path() != self.render_route {
            return EdgeResult::PassThrough(request);
        }
        debug!("edge rendering {}", request.uri);
        EdgeResult::Respond(EdgeResponse {
            status: 200,
            body: self.document(request.uri.path()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> AssetManifest {
        AssetManifest {
            client: ClientBundle {
                css: Some("/static/css/bundle.css".into()),
                js: Some("/static/js/bundle.js".into()),
            },
        }
    }

    fn request(uri: &str) -> EdgeRequest {
        EdgeRequest {
            uri: uri.parse().unwrap(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn handler(mode: Mode) -> EdgeHandler {
        EdgeHandler::new(
            DEFAULT_RENDER_ROUTE,
            manifest(),
            mode,
            Arc::new(ShellRenderer::default()),
        )
    }

    #[test]
    fn other_paths_pass_through_unchanged() {
        let result = handler(Mode::Production).handle(request("/static/js/bundle.js"));
        match result {
            EdgeResult::PassThrough(req) => assert_eq!(req.uri.path(), "/static/js/bundle.js"),
            EdgeResult::Respond(_) => panic!("expected pass-through"),
        }
    }

    #[test]
    fn render_route_answers_with_document() {
        let result = handler(Mode::Production).handle(request("/render"));
        let EdgeResult::Respond(response) = result else {
            panic!("expected a rendered response");
        };
        assert_eq!(response.status, 200);
        assert!(response.body.starts_with("<!doctype html>"));
        assert!(response.body.contains(r#"<link rel="stylesheet" href="/static/css/bundle.css">"#));
        assert!(response.body.contains(r#"<script src="/static/js/bundle.js" defer></script>"#));
        assert!(response.body.contains(r#"<div id="root"></div>"#));
    }

    #[test]
    fn development_scripts_are_crossorigin() {
        let body = handler(Mode::Development).document("/");
        assert!(body.contains("defer crossorigin"));
    }

    #[test]
    fn empty_manifest_omits_bundle_tags() {
        let body = render_document("", "t", &AssetManifest::default(), Mode::Production);
        assert!(!body.contains("<script"));
        assert!(!body.contains("<link"));
    }

    #[test]
    fn manifest_parses_razzle_layout() {
        let parsed: AssetManifest =
            serde_json::from_str(r#"{"client":{"js":"/a.js"},"vendor":{"js":"/v.js"}}"#).unwrap();
        assert_eq!(parsed.client.js.as_deref(), Some("/a.js"));
        assert!(parsed.client.css.is_none());
    }
}

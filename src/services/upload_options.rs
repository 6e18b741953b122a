//! Derives the full upload intent for one local file.

use crate::errors::{PublishError, PublishResult};
use crate::models::asset::{AccessPolicy, LifecycleTag, UploadDescriptor};
use crate::services::integrity::Integrity;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Content type used when the extension is not recognized.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownContentType {
    /// `text/html`, matching objects already published by earlier releases.
    #[default]
    Html,
    OctetStream,
}

impl UnknownContentType {
    pub fn content_type(&self) -> &'static str {
        match self {
            UnknownContentType::Html => HTML_CONTENT_TYPE,
            UnknownContentType::OctetStream => OCTET_STREAM,
        }
    }
}

impl FromStr for UnknownContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(UnknownContentType::Html),
            "octet-stream" => Ok(UnknownContentType::OctetStream),
            other => Err(format!(
                "unknown fallback `{}` (expected `html` or `octet-stream`)",
                other
            )),
        }
    }
}

/// Per-container knobs for descriptor building.
#[derive(Clone, Copy, Debug)]
pub struct UploadOptions {
    pub access_policy: AccessPolicy,
    pub unknown_content_type: UnknownContentType,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            access_policy: AccessPolicy::PublicRead,
            unknown_content_type: UnknownContentType::Html,
        }
    }
}

/// Read `path` and build everything needed to publish it under `bucket`.
///
/// The file is read on every call; nothing is cached between evaluations.
pub async fn build_upload_descriptor(
    root: &Path,
    path: &Path,
    bucket: &str,
    options: &UploadOptions,
) -> PublishResult<UploadDescriptor> {
    let key = logical_key(root, path)?;
    let absolute = lexical_normalize(&to_absolute(path));

    let body = tokio::fs::read(&absolute)
        .await
        .map_err(|source| PublishError::SourceUnavailable {
            key: key.clone(),
            path: absolute.clone(),
            source,
        })?;

    let integrity = Integrity::from_data(&body);
    let content_type = content_type_for(&key)
        .unwrap_or_else(|| options.unknown_content_type.content_type())
        .to_string();

    Ok(UploadDescriptor {
        bucket: bucket.to_string(),
        key,
        body: Bytes::from(body),
        content_type,
        access_policy: options.access_policy,
        integrity,
        lifecycle_tag: LifecycleTag::Active,
    })
}

/// Forward-slash path of `path` relative to `root`, independent of host separators.
pub fn logical_key(root: &Path, path: &Path) -> PublishResult<String> {
    let root = lexical_normalize(&to_absolute(root));
    let full = lexical_normalize(&to_absolute(path));

    let relative = full
        .strip_prefix(&root)
        .map_err(|_| PublishError::PathOutsideRoot {
            path: full.clone(),
            root: root.clone(),
        })?;

    let key = to_posix_key(relative);
    if key.is_empty() {
        return Err(PublishError::PathOutsideRoot { path: full, root });
    }
    Ok(key)
}

/// Join path components with `/`, also splitting on `\` so keys built from
/// Windows-style relative paths come out identical.
pub fn to_posix_key(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .flat_map(|part| {
            part.split('\\')
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn to_absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else if !matches!(components.last(), Some(Component::RootDir)) {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

/// Content type by file extension, or `None` when unknown.
pub fn content_type_for(key: &str) -> Option<&'static str> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let (_, ext) = file_name.rsplit_once('.')?;
    let content_type = match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => HTML_CONTENT_TYPE,
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        _ => return None,
    };
    Some(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_is_relative_with_forward_slashes() {
        let root = Path::new("/srv/build/public");
        let path = root.join("sub").join("dir").join("file.txt");
        assert_eq!(logical_key(root, &path).unwrap(), "sub/dir/file.txt");
    }

    #[test]
    fn backslash_separators_are_normalized() {
        assert_eq!(to_posix_key(Path::new(r"sub\dir\file.txt")), "sub/dir/file.txt");
    }

    #[test]
    fn dot_segments_are_resolved_lexically() {
        let root = Path::new("/srv/./public");
        let path = Path::new("/srv/public/css/../js/app.js");
        assert_eq!(logical_key(root, path).unwrap(), "js/app.js");
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let err = logical_key(Path::new("/srv/public"), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, PublishError::PathOutsideRoot { .. }));

        let err = logical_key(Path::new("/srv/public"), Path::new("/srv/public")).unwrap_err();
        assert!(matches!(err, PublishError::PathOutsideRoot { .. }));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("css/app.css"), Some("text/css; charset=utf-8"));
        assert_eq!(content_type_for("IMG/LOGO.PNG"), Some("image/png"));
        assert_eq!(content_type_for("LICENSE"), None);
        assert_eq!(content_type_for("archive.unknownext"), None);
    }

    #[tokio::test]
    async fn descriptor_carries_digest_tag_and_policy() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        let file = dir.path().join("css").join("app.css");
        std::fs::write(&file, b"body{}").unwrap();

        let descriptor =
            build_upload_descriptor(dir.path(), &file, "site-static", &UploadOptions::default())
                .await
                .unwrap();

        assert_eq!(descriptor.bucket, "site-static");
        assert_eq!(descriptor.key, "css/app.css");
        assert_eq!(descriptor.content_type, "text/css; charset=utf-8");
        assert_eq!(descriptor.access_policy, AccessPolicy::PublicRead);
        assert_eq!(descriptor.lifecycle_tag, LifecycleTag::Active);
        assert!(descriptor.integrity.check(b"body{}"));
        assert_eq!(
            descriptor.metadata().get("integrity"),
            Some(&descriptor.integrity.to_string())
        );
    }

    #[tokio::test]
    async fn unknown_extension_uses_configured_fallback() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("CHANGELOG");
        std::fs::write(&file, b"notes").unwrap();

        let html = build_upload_descriptor(dir.path(), &file, "b", &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(html.content_type, "text/html; charset=utf-8");

        let options = UploadOptions {
            unknown_content_type: UnknownContentType::OctetStream,
            ..UploadOptions::default()
        };
        let binary = build_upload_descriptor(dir.path(), &file, "b", &options)
            .await
            .unwrap();
        assert_eq!(binary.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gone.js");

        let err = build_upload_descriptor(dir.path(), &file, "b", &UploadOptions::default())
            .await
            .unwrap_err();
        match err {
            PublishError::SourceUnavailable { key, .. } => assert_eq!(key, "gone.js"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

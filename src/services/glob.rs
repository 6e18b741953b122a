//! Snapshot glob expansion over a directory tree.
//!
//! Patterns use globset syntax with `/` as a literal separator: `*` stays in
//! one path segment, `**` crosses segments, `{a,b}` and `[abc]` work as usual.
//! A pattern starting with `!` excludes matches instead of adding them.

use crate::errors::{PublishError, PublishResult};
use crate::services::upload_options::to_posix_key;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::debug;
use walkdir::WalkDir;

/// Options for [`expand`].
#[derive(Clone, Debug, Default)]
pub struct GlobOptions {
    /// Directory the patterns are relative to. Defaults to the process cwd.
    pub cwd: Option<PathBuf>,

    /// Match entries whose name starts with a dot.
    pub dot: bool,

    /// Extra exclusion patterns.
    pub ignore: Vec<String>,
}

impl GlobOptions {
    /// Resolved root directory.
    pub fn root(&self) -> PathBuf {
        match &self.cwd {
            Some(cwd) if cwd.is_absolute() => cwd.clone(),
            Some(cwd) => env::current_dir()
                .map(|dir| dir.join(cwd))
                .unwrap_or_else(|_| cwd.clone()),
            None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Expand `patterns` into sorted, forward-slash relative file paths.
///
/// Only regular files are returned; symlinks are not followed. The result is
/// deterministic for a fixed filesystem snapshot.
pub fn expand(patterns: &[String], options: &GlobOptions) -> PublishResult<Vec<String>> {
    let (include, exclude): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| !p.starts_with('!'));

    let include_set = build_set(include.iter().map(|p| p.as_str()))?;
    let exclude_set = build_set(
        exclude
            .iter()
            .map(|p| &p[1..])
            .chain(options.ignore.iter().map(String::as_str)),
    )?;

    let root = options.root();
    let mut matched = Vec::new();
    for entry in WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| options.dot || entry.depth() == 0 || !is_hidden(entry.path()))
    {
        // an unreadable directory must fail the expansion, not shrink it
        let entry = entry.map_err(|source| PublishError::GlobWalk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.clone()),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(&root) {
            Ok(relative) => to_posix_key(relative),
            Err(_) => continue,
        };
        if include_set.is_match(&relative) && !exclude_set.is_match(&relative) {
            matched.push(relative);
        }
    }

    matched.sort();
    debug!(
        "glob {:?} under {} matched {} files",
        patterns,
        root.display(),
        matched.len()
    );
    Ok(matched)
}

fn build_set<'a>(patterns: impl Iterator<Item = &'a str>) -> PublishResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| PublishError::InvalidGlob {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| PublishError::InvalidGlob {
        pattern: "<set>".into(),
        reason: e.to_string(),
    })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

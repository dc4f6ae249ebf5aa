// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request path to cache path resolution.
//!
//! Resolution is purely lexical: it lower-cases the request, strips the route
//! prefix, folds `\` into `/` and then cleans `.`/`..` segments against a
//! virtual root. A `..` that would climb above the root is dropped, so the
//! composed file path always stays under the cache root. Percent-encoded dot
//! segments (`%2e`, `.%2e`, ...) count as dots, because URL parsers treat them
//! that way when the sub-path is forwarded upstream.

use std::path::Path;

use crate::error::{Error, Result};
use crate::route::{merge_slashes, normalize_route};

/// Longest cache file path (in bytes) that will be resolved.
pub const MAX_FILE_PATH_LEN: usize = 255;

/// Resolves request paths against a cache root and route prefix.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: String,
    /// Route prefix without its trailing `/`, lower-cased.
    prefix: String,
}

/// A request path resolved to its cache location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    sub_path: String,
    file_path: String,
}

impl PathResolver {
    /// Create a resolver for `root`, matching requests under `route`.
    ///
    /// The route is normalized with [`normalize_route`], so callers may pass
    /// it in any form.
    pub fn new(root: &str, route: &str) -> Self {
        let root = if root.is_empty() { "." } else { root };
        let route = normalize_route(&route.to_lowercase());

        Self {
            root: root.to_string(),
            prefix: route.trim_end_matches('/').to_string(),
        }
    }

    /// The cache root this resolver composes paths under.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The effective route prefix, with leading and trailing `/`.
    pub fn route(&self) -> String {
        format!("{}/", self.prefix)
    }

    /// Whether `request_path` falls under the route prefix.
    pub fn matches(&self, request_path: &str) -> bool {
        self.strip_route(&merge_slashes(&request_path.to_lowercase()))
            .is_some()
    }

    /// Resolve a raw request path.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath> {
        let lowered = merge_slashes(&request_path.to_lowercase());
        let rest = self
            .strip_route(&lowered)
            .ok_or_else(|| Error::RouteMismatch(request_path.to_string()))?;

        let sub_path = clean_path(rest);
        let file_path = self.compose(&sub_path);

        if file_path.len() > MAX_FILE_PATH_LEN {
            return Err(Error::PathTooLong {
                len: file_path.len(),
                max: MAX_FILE_PATH_LEN,
            });
        }

        Ok(ResolvedPath {
            sub_path,
            file_path,
        })
    }

    fn strip_route<'a>(&self, lowered: &'a str) -> Option<&'a str> {
        let rest = lowered.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    fn compose(&self, sub_path: &str) -> String {
        if sub_path.is_empty() {
            let root = merge_slashes(&self.root);
            return match root.trim_end_matches('/') {
                "" => "/".to_string(),
                trimmed => trimmed.to_string(),
            };
        }
        merge_slashes(&format!("{}/{}", self.root, sub_path))
    }
}

impl ResolvedPath {
    /// Normalized sub-path below the route, without leading or trailing `/`.
    /// Empty when the request addressed the route prefix itself.
    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    /// Cache file path, `root/sub-path` with separators merged.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Cache file path as a [`Path`].
    pub fn as_path(&self) -> &Path {
        Path::new(&self.file_path)
    }
}

/// Lexically clean a `/`-separated path against a virtual root.
///
/// Empty and `.` segments are removed, `..` removes the preceding segment and
/// is dropped when there is none. Either dot may be written as `%2e`. The
/// result has no leading or trailing `/`.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        if segment.is_empty() || is_single_dot(segment) {
            continue;
        }
        if is_double_dot(segment) {
            segments.pop();
        } else {
            segments.push(segment);
        }
    }

    segments.join("/")
}

fn is_single_dot(segment: &str) -> bool {
    is_dot(segment.as_bytes())
}

fn is_double_dot(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    // `..` with either dot possibly written as `%2e`.
    [1, 3]
        .into_iter()
        .filter(|&at| at < bytes.len())
        .any(|at| is_dot(&bytes[..at]) && is_dot(&bytes[at..]))
}

fn is_dot(bytes: &[u8]) -> bool {
    bytes == b"." || bytes.eq_ignore_ascii_case(b"%2e")
}

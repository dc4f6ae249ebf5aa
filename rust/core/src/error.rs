// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for path resolution.

/// Result type alias for path resolution.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The request path does not start with the configured route prefix.
    #[error("request path {0:?} is outside route prefix")]
    RouteMismatch(String),

    /// The composed cache file path exceeds the supported length.
    #[error("cache file path is {len} bytes, maximum is {max}")]
    PathTooLong { len: usize, max: usize },
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Origin fetcher: fills one cache file from the upstream symbol server.
//!
//! Nothing is written to disk until the origin has answered with a success
//! status. The body is streamed into a hidden `.<uuid>.part` file in the
//! destination's directory and renamed into place once complete, so a reader
//! never sees a truncated entry. The `.part` file is removed if the fetch fails
//! or is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors that can occur while filling a cache entry.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("origin request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("origin returned status {status}")]
    Upstream { status: u16 },

    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl FetchError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> FetchError + '_ {
        move |source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// HTTP client for the origin symbol server.
#[derive(Debug, Clone)]
pub struct OriginFetcher {
    origin: String,
    http: reqwest::Client,
}

impl OriginFetcher {
    /// Create a fetcher for `origin` whose requests time out after `timeout`
    /// (connect, headers and body together).
    pub fn new(origin: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("symproxy/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Upstream URL for a sanitized sub-path.
    pub fn url_for(&self, sub_path: &str) -> String {
        format!("{}/{}", self.origin, sub_path)
    }

    /// Download `sub_path` from the origin into `dest`.
    ///
    /// Returns the number of bytes written.
    pub async fn fetch(&self, sub_path: &str, dest: &Path) -> Result<u64, FetchError> {
        let url = self.url_for(sub_path);
        tracing::info!(url = %url, "Fetching from origin");

        let mut response = self.http.get(&url).send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Upstream {
                status: status.as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FetchError::io(parent))?;
        }

        let part = PartFile::beside(dest);
        let mut file = tokio::fs::File::create(part.path())
            .await
            .map_err(FetchError::io(part.path()))?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(FetchError::io(part.path()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(FetchError::io(part.path()))?;
        drop(file);

        part.persist(dest).await?;

        tracing::info!(url = %url, path = %dest.display(), bytes = written, "Cached from origin");
        Ok(written)
    }
}

/// A temporary file beside the destination, removed on drop unless persisted.
///
/// The name has a fixed length so it fits wherever the destination name fits.
struct PartFile {
    path: PathBuf,
    persisted: bool,
}

impl PartFile {
    fn beside(dest: &Path) -> Self {
        let path = dest.with_file_name(format!(".{}.part", uuid::Uuid::new_v4().simple()));

        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(mut self, dest: &Path) -> Result<(), FetchError> {
        tokio::fs::rename(&self.path, dest)
            .await
            .map_err(FetchError::io(dest))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed partial download"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove partial download"
            ),
        }
    }
}

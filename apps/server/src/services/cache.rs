// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk cache store.
//!
//! A cache entry is a regular file under the cache root; its presence on disk
//! is the only record of it.

use std::io;
use std::path::{Path, PathBuf};

use async_stream::try_stream;
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use thiserror::Error;
use tokio::{fs::File, io::AsyncReadExt};

/// Read size for streamed responses.
const CHUNK_SIZE: usize = 64 * 1024;

/// Errors from reading the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to stat {}: {source}", path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("{} is no longer a cached file", path.display())]
    Vanished { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// Filesystem-backed cache of symbol files.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();

        if let Err(e) = tokio::fs::create_dir_all(&root).await {
            tracing::warn!(
                error = %e,
                path = %root.display(),
                "Failed to create cache directory"
            );
        }

        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a regular file is cached at `path`.
    ///
    /// Directories and missing paths are `Ok(false)`. Any other stat failure
    /// is returned so callers can log it instead of mistaking it for a miss.
    pub async fn exists(&self, path: &Path) -> Result<bool, CacheError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(false)
            }
            Err(source) => Err(CacheError::Stat {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Stream the file at `path` as a `200 OK` response.
    pub async fn serve(&self, path: &Path) -> Result<Response, CacheError> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::Vanished {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let meta = file.metadata().await.map_err(|source| CacheError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.is_file() {
            return Err(CacheError::Vanished {
                path: path.to_path_buf(),
            });
        }

        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        tracing::debug!(
            path = %path.display(),
            bytes = meta.len(),
            content_type = %content_type,
            "Serving cached file"
        );

        Ok((
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CONTENT_LENGTH, meta.len().to_string()),
            ],
            Body::from_stream(read_chunks(file)),
        )
            .into_response())
    }
}

fn read_chunks(mut file: File) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    try_stream! {
        loop {
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            let read = file.read_buf(&mut buf).await?;
            if read == 0 {
                break;
            }
            yield buf.freeze();
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request coordination: resolve, check, fill on miss, re-check, serve.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::response::Response;
use serde::Serialize;
use symproxy_core::{PathResolver, ResolvedPath};

use crate::config::Config;
use crate::error::ApiError;
use crate::services::{CacheStore, FetchError, FillLocks, OriginFetcher};

/// Counters since startup.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fills: u64,
    pub failures: u64,
    /// Cache entries with a fill running or queued.
    pub in_flight: usize,
}

/// Serves symbol requests from the cache, filling it from the origin on a
/// miss.
#[derive(Debug)]
pub struct RequestCoordinator {
    resolver: PathResolver,
    store: CacheStore,
    fetcher: OriginFetcher,
    locks: FillLocks,
    counters: Counters,
}

impl RequestCoordinator {
    /// Build a coordinator from an explicit configuration.
    pub async fn new(config: &Config) -> Result<Self, FetchError> {
        let store = CacheStore::new(&config.root).await;
        tracing::debug!(root = %store.root().display(), "Cache store ready");

        Ok(Self {
            resolver: PathResolver::new(&config.root, &config.route),
            store,
            fetcher: OriginFetcher::new(&config.origin, config.timeout())?,
            locks: FillLocks::new(),
            counters: Counters::default(),
        })
    }

    /// Whether `request_path` belongs to the symbol route.
    pub fn matches(&self, request_path: &str) -> bool {
        self.resolver.matches(request_path)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fills: self.counters.fills.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            in_flight: self.locks.in_flight(),
        }
    }

    /// Answer one symbol request.
    pub async fn handle(&self, request_path: &str) -> Result<Response, ApiError> {
        let resolved = self.resolver.resolve(request_path).map_err(|e| {
            match &e {
                symproxy_core::Error::PathTooLong { .. } => {
                    tracing::warn!(path = %request_path, error = %e, "Rejected request path");
                }
                symproxy_core::Error::RouteMismatch(_) => {
                    tracing::debug!(path = %request_path, "Request outside symbol route");
                }
            }
            ApiError::from(e)
        })?;

        // The cache root itself is a directory and never servable.
        if resolved.sub_path().is_empty() {
            return Err(ApiError::FileNotFound);
        }

        let path = resolved.as_path();
        if self.is_cached(path).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(path = %resolved.file_path(), "Cache HIT");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            tracing::info!(path = %resolved.file_path(), "Cache MISS");

            self.fill(&resolved).await?;

            if !self.is_cached(path).await {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %resolved.file_path(), "File not found after fill");
                return Err(ApiError::FileNotFound);
            }
        }

        self.store.serve(path).await.map_err(|e| {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Failed to serve cached file");
            ApiError::FileNotFound
        })
    }

    async fn fill(&self, resolved: &ResolvedPath) -> Result<(), ApiError> {
        let path = resolved.as_path();
        let _guard = self.locks.lock(path).await;

        if self.is_cached(path).await {
            tracing::debug!(path = %resolved.file_path(), "Filled by a concurrent request");
            return Ok(());
        }

        match self.fetcher.fetch(resolved.sub_path(), path).await {
            Ok(_) => {
                self.counters.fills.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    url = %self.fetcher.url_for(resolved.sub_path()),
                    error = %e,
                    "Download failed"
                );
                Err(ApiError::DownloadFailed)
            }
        }
    }

    async fn is_cached(&self, path: &Path) -> bool {
        match self.store.exists(path).await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::StubOrigin;
    use axum::http::StatusCode;
    use std::time::Duration;

    async fn coordinator(root: &Path, origin: &StubOrigin) -> RequestCoordinator {
        let config = Config {
            root: root.to_string_lossy().into_owned(),
            origin: origin.base_url(),
            timeout_secs: 5,
            ..Config::default()
        }
        .validated()
        .unwrap();
        RequestCoordinator::new(&config).await.unwrap()
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn miss_fills_once_then_serves_from_disk() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let first = coordinator
            .handle("/download/symbols/foo.pdb/ABC123/foo.pdb")
            .await
            .ok()
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_of(first).await, b"DATA");

        let second = coordinator
            .handle("/download/symbols/foo.pdb/ABC123/foo.pdb")
            .await
            .ok()
            .unwrap();
        assert_eq!(body_of(second).await, b"DATA");

        assert_eq!(origin.hits(), 1);
        assert_eq!(origin.requests(), vec!["/symbols/foo.pdb/abc123/foo.pdb"]);
        assert_eq!(
            std::fs::read(dir.path().join("foo.pdb/abc123/foo.pdb")).unwrap(),
            b"DATA"
        );
        assert_eq!(
            coordinator.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                fills: 1,
                failures: 0,
                in_flight: 0,
            }
        );
    }

    #[tokio::test]
    async fn case_variants_share_one_entry() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        for path in [
            "/DOWNLOAD/SYMBOLS/Foo.PDB/AbC/FOO.pdb",
            "/download/symbols/foo.pdb/abc/foo.pdb",
            "/Download/Symbols//foo.pdb\\abc\\foo.pdb",
        ] {
            let response = coordinator.handle(path).await.ok().unwrap();
            assert_eq!(body_of(response).await, b"DATA");
        }
        assert_eq!(origin.hits(), 1);
    }

    #[tokio::test]
    async fn upstream_404_is_download_failed_and_leaves_nothing() {
        let origin = StubOrigin::spawn(StatusCode::NOT_FOUND, b"missing").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let err = coordinator
            .handle("/download/symbols/foo.pdb/ABC123/foo.pdb")
            .await
            .err()
            .unwrap();

        assert_eq!(err, ApiError::DownloadFailed);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(!dir.path().join("foo.pdb").exists());
        assert_eq!(coordinator.stats().failures, 1);
    }

    #[tokio::test]
    async fn failed_download_is_retried_by_next_request() {
        let origin = StubOrigin::spawn(StatusCode::SERVICE_UNAVAILABLE, b"").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        for _ in 0..2 {
            let err = coordinator.handle("/download/symbols/a.pdb/1/a.pdb").await.err();
            assert_eq!(err, Some(ApiError::DownloadFailed));
        }
        assert_eq!(origin.hits(), 2);
    }

    #[tokio::test]
    async fn long_path_fails_without_io() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let request = format!("/download/symbols/{}/1/x.pdb", "x".repeat(300));
        let err = coordinator.handle(&request).await.err().unwrap();

        assert_eq!(err, ApiError::PathTooLong);
        assert_eq!(origin.hits(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn blocked_directory_is_download_failed() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.pdb"), b"not a directory").unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let err = coordinator
            .handle("/download/symbols/foo.pdb/abc/foo.pdb")
            .await
            .err()
            .unwrap();

        assert_eq!(err, ApiError::DownloadFailed);
    }

    #[tokio::test]
    async fn traversal_stays_inside_root() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let coordinator = coordinator(&root, &origin).await;

        let response = coordinator
            .handle("/download/symbols/../..\\..\\outside.pdb")
            .await
            .ok()
            .unwrap();
        assert_eq!(body_of(response).await, b"DATA");

        assert!(root.join("outside.pdb").is_file());
        assert!(!dir.path().join("outside.pdb").exists());
        assert_eq!(origin.requests(), vec!["/symbols/outside.pdb"]);
    }

    #[tokio::test]
    async fn encoded_traversal_stays_under_origin_base() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let coordinator = coordinator(&root, &origin).await;

        let response = coordinator
            .handle("/download/symbols/%2e%2e/%2E%2e/secret.pdb")
            .await
            .ok()
            .unwrap();
        assert_eq!(body_of(response).await, b"DATA");

        assert_eq!(origin.requests(), vec!["/symbols/secret.pdb"]);
        assert!(root.join("secret.pdb").is_file());
        assert!(!root.join("%2e%2e").exists());
    }

    #[tokio::test]
    async fn longest_file_name_within_limit_is_cached() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let root_len = dir.path().to_string_lossy().len();
        let name = "n".repeat((symproxy_core::MAX_FILE_PATH_LEN - root_len - 1).min(255));
        assert!(name.len() > 217, "temp dir path too long for this test");

        let response = coordinator
            .handle(&format!("/download/symbols/{name}"))
            .await
            .ok()
            .unwrap();
        assert_eq!(body_of(response).await, b"DATA");
        assert_eq!(origin.hits(), 1);
        assert!(dir.path().join(&name).is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stat_failure_is_treated_as_miss() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        // A self-referencing symlink fails stat with ELOOP.
        let looped = dir.path().join("loop.pdb");
        std::os::unix::fs::symlink(&looped, &looped).unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let response = coordinator
            .handle("/download/symbols/loop.pdb")
            .await
            .ok()
            .unwrap();
        assert_eq!(body_of(response).await, b"DATA");

        assert_eq!(origin.hits(), 1);
        let stats = coordinator.stats();
        assert_eq!((stats.hits, stats.misses, stats.fills), (0, 1, 1));
        assert!(std::fs::symlink_metadata(&looped).unwrap().is_file());
    }

    #[tokio::test]
    async fn route_root_is_not_servable() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let err = coordinator.handle("/download/symbols/").await.err();
        assert_eq!(err, Some(ApiError::FileNotFound));
        assert_eq!(origin.hits(), 0);
    }

    #[tokio::test]
    async fn cached_directory_is_not_a_hit() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("foo.pdb/abc")).unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        // The directory forces a miss; renaming the fill onto it then fails.
        let err = coordinator.handle("/download/symbols/foo.pdb/abc").await.err();
        assert_eq!(err, Some(ApiError::DownloadFailed));
        assert_eq!(origin.hits(), 1);
        assert!(dir.path().join("foo.pdb/abc").is_dir());
    }

    #[tokio::test]
    async fn outside_route_is_not_found() {
        let origin = StubOrigin::spawn(StatusCode::OK, b"DATA").await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        assert!(!coordinator.matches("/other/foo.pdb"));
        let err = coordinator.handle("/other/foo.pdb").await.err();
        assert_eq!(err, Some(ApiError::NotFound));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let origin = StubOrigin::builder()
            .body(b"SHARED")
            .delay(Duration::from_millis(200))
            .spawn()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &origin).await;

        let requests = (0..8).map(|_| coordinator.handle("/download/symbols/s.pdb/1/s.pdb"));
        let responses = futures::future::join_all(requests).await;

        for response in responses {
            let response = response.ok().unwrap();
            assert_eq!(body_of(response).await, b"SHARED");
        }
        assert_eq!(origin.hits(), 1);
        assert_eq!(coordinator.stats().fills, 1);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entry locks serializing cache fills.
//!
//! Requests for the same cache path queue on one async mutex, so only the
//! first holder fetches from the origin and the rest find the file already
//! present when they get the lock. Different paths never contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while filling one cache entry.
pub type FillGuard = OwnedMutexGuard<()>;

/// Map of in-flight fill locks keyed by cache file path.
#[derive(Debug, Default)]
pub struct FillLocks {
    locks: Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>,
}

impl FillLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive fill rights on `path`.
    pub async fn lock(&self, path: &Path) -> FillGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            match locks.get(path).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    // Entries whose guards have all been dropped are dead.
                    locks.retain(|_, weak| weak.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }

    /// Number of paths with a live lock.
    pub fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

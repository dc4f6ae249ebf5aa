// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service modules for serving and filling the symbol cache.

pub mod cache;
pub mod coordinator;
pub mod fill_lock;
pub mod origin;

pub use cache::CacheStore;
pub use coordinator::{CacheStats, RequestCoordinator};
pub use fill_lock::FillLocks;
pub use origin::{FetchError, OriginFetcher};

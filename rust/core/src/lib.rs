// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # SymProxy Core
//!
//! Lexical request-path handling for the SymProxy symbol cache.
//!
//! ## Overview
//!
//! A symbol request such as `/download/symbols/ntdll.pdb/ABC123/ntdll.pdb`
//! has to become two things:
//!
//! - **a cache file path** under the configured cache root, which must never
//!   escape that root no matter how many `..` or `\` segments the client sends
//! - **an upstream sub-path** appended to the origin base URL on a miss
//!
//! Nothing in this crate touches the filesystem or the network, so every rule
//! here is a pure function of its input.
//!
//! ## Quick Start
//!
//! ```rust
//! use symproxy_core::PathResolver;
//!
//! let resolver = PathResolver::new("./symbols", "download/symbols");
//! let resolved = resolver
//!     .resolve("/Download/Symbols/NTDLL.pdb/ABC123/../ABC123/ntdll.pdb")
//!     .unwrap();
//!
//! assert_eq!(resolved.sub_path(), "ntdll.pdb/abc123/ntdll.pdb");
//! assert_eq!(resolved.file_path(), "./symbols/ntdll.pdb/abc123/ntdll.pdb");
//! ```

pub mod error;
pub mod resolve;
pub mod route;

pub use error::{Error, Result};
pub use resolve::{clean_path, PathResolver, ResolvedPath, MAX_FILE_PATH_LEN};
pub use route::{merge_slashes, normalize_route};

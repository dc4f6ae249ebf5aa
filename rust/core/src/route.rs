// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Separator handling and route prefix normalization.

/// Collapse every run of `/` and `\` into a single `/`.
pub fn merge_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;

    for ch in input.chars() {
        if ch == '/' || ch == '\\' {
            if !in_run {
                out.push('/');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }

    out
}

/// Normalize a configured route prefix to exactly one leading and one
/// trailing `/`.
///
/// `download/symbols`, `/download/symbols` and `//download\\symbols//` all
/// become `/download/symbols/`. An empty route becomes `/`.
pub fn normalize_route(route: &str) -> String {
    merge_slashes(&format!("/{}/", route))
}

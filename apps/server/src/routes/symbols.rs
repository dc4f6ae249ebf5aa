// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Symbol download endpoint.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::State,
    http::{Method, Uri},
    response::Response,
};

/// GET {route}* - Serve a symbol file, fetching it from the origin on a miss.
///
/// Mounted as the router fallback so the route prefix can be matched
/// case-insensitively.
pub async fn download(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    let path = uri.path();

    if !state.coordinator.matches(path) {
        return Err(ApiError::NotFound);
    }
    if method != Method::GET && method != Method::HEAD {
        return Err(ApiError::MethodNotAllowed);
    }

    tracing::debug!(path = %path, "Symbol request");
    state.coordinator.handle(path).await
}

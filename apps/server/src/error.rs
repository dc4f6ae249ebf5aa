// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client-facing error responses.
//!
//! Every failure on the symbol route collapses to a short plain-text reason.
//! Upstream statuses, I/O errors and file paths are logged where they occur
//! and never reach the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// API error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("path too long")]
    PathTooLong,

    #[error("download failed")]
    DownloadFailed,

    #[error("file not found")]
    FileNotFound,

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::NotFound
            | ApiError::PathTooLong
            | ApiError::DownloadFailed
            | ApiError::FileNotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

impl From<symproxy_core::Error> for ApiError {
    fn from(err: symproxy_core::Error) -> Self {
        match err {
            symproxy_core::Error::RouteMismatch(_) => ApiError::NotFound,
            symproxy_core::Error::PathTooLong { .. } => ApiError::PathTooLong,
        }
    }
}

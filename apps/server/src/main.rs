// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SymProxy Server - write-through disk cache for a debug symbol server.
//!
//! Symbol requests are answered from the local cache root when the file is
//! present. On a miss the file is downloaded from the origin, stored under
//! the same relative path, and then served.
//!
//! # Endpoints
//!
//! - `GET {route}*` - Symbol file (default route `/download/symbols/`)
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - Cache counters
//!
//! # Configuration
//!
//! Read from the JSON file named by the first argument, `SYMPROXY_CONFIG`,
//! or `SymProxy.json`, then overridden by `SYMPROXY_*` variables.

use std::sync::Arc;

use anyhow::Context;

mod config;
mod error;
mod routes;
mod services;

use config::{Config, DEFAULT_CONFIG_FILE};
use services::{FetchError, RequestCoordinator};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RequestCoordinator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, FetchError> {
        let coordinator = RequestCoordinator::new(&config).await?;
        Ok(Self {
            coordinator: Arc::new(coordinator),
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SYMPROXY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    tracing::info!(
        config = %config_path,
        bind = %config.bind_addr(),
        root = %config.root,
        route = %config.route,
        origin = %config.origin,
        timeout_secs = config.timeout_secs,
        "Starting SymProxy"
    );

    let state = AppState::new(config)
        .await
        .context("Failed to build origin client")?;
    let bind_addr = state.config.bind_addr();
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,tower_http=debug,symproxy_server=debug".into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration loaded from a JSON file with environment overrides.
//!
//! The file uses the `SymProxy.json` layout:
//!
//! ```json
//! { "Ip": "0.0.0.0", "Port": "80", "Root": "./symbols",
//!   "Route": "/download/symbols/", "Timeout": 300 }
//! ```
//!
//! Every key is optional. A missing file yields the defaults, but a file that
//! exists and cannot be read or parsed is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use symproxy_core::normalize_route;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "SymProxy.json";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind.
    #[serde(rename = "Ip", alias = "ip")]
    pub ip: String,
    /// Port to listen on. Accepts a JSON string or number.
    #[serde(rename = "Port", alias = "port", deserialize_with = "deserialize_port")]
    pub port: u16,
    /// Cache root directory.
    #[serde(rename = "Root", alias = "root")]
    pub root: String,
    /// Route prefix for symbol requests.
    #[serde(rename = "Route", alias = "route")]
    pub route: String,
    /// Upstream fetch timeout in seconds.
    #[serde(rename = "Timeout", alias = "timeout")]
    pub timeout_secs: u64,
    /// Base URL of the origin symbol server.
    #[serde(rename = "Origin", alias = "origin")]
    pub origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".into(),
            port: 80,
            root: "./symbols".into(),
            route: "/download/symbols/".into(),
            timeout_secs: 300,
            origin: "http://msdl.microsoft.com/download/symbols".into(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, then apply `SYMPROXY_*` environment
    /// overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config
            .with_overrides(|key| std::env::var(key).ok())?
            .validated()
    }

    /// Parse a JSON document; keys absent from it keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply overrides looked up by environment variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup("SYMPROXY_IP") {
            self.ip = ip;
        }
        if let Some(port) = lookup("SYMPROXY_PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "SYMPROXY_PORT",
                value: port.clone(),
                reason: "expected a port number",
            })?;
        }
        if let Some(root) = lookup("SYMPROXY_ROOT") {
            self.root = root;
        }
        if let Some(route) = lookup("SYMPROXY_ROUTE") {
            self.route = route;
        }
        if let Some(timeout) = lookup("SYMPROXY_TIMEOUT") {
            self.timeout_secs = timeout.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "SYMPROXY_TIMEOUT",
                value: timeout.clone(),
                reason: "expected a number of seconds",
            })?;
        }
        if let Some(origin) = lookup("SYMPROXY_ORIGIN") {
            self.origin = origin;
        }
        Ok(self)
    }

    /// Normalize the route and reject values the server cannot run with.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.route = normalize_route(&self.route);

        if self.root.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "Root",
                value: self.root,
                reason: "cache root must not be empty",
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "Timeout",
                value: "0".into(),
                reason: "timeout must be at least one second",
            });
        }
        match reqwest::Url::parse(&self.origin) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid {
                    key: "Origin",
                    value: self.origin,
                    reason: "expected an absolute http(s) URL",
                })
            }
        }

        Ok(self)
    }

    /// Upstream fetch timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `ip:port` suitable for binding, with IPv6 addresses bracketed.
    pub fn bind_addr(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

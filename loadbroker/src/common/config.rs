/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use loadbroker_core::message::ASSIGNED_IDENTITY_PREFIX;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reading or validating a [`LoadBrokerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML was not valid for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The values parsed but cannot run.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the broker and its simulation harness.
///
/// Loaded from TOML in an XDG-compliant location. Every section and field has
/// a default, so a partial file only overrides what it names.
///
/// ```toml
/// [broker]
/// poll_timeout_ms = 1000
/// ready_marker = "READY"
///
/// [harness]
/// clients = 10
/// workers = 3
/// requests_per_client = 1
/// frontend = "inproc://frontend"
/// backend = "inproc://backend"
///
/// [limits]
/// channel_capacity = 255
///
/// [timeouts]
/// shutdown_timeout_ms = 10000
/// client_reply_timeout_ms = 30000
///
/// [tracing]
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBrokerConfig {
    /// Routing loop settings.
    pub broker: BrokerConfig,
    /// Simulated client and worker pools.
    pub harness: HarnessConfig,
    /// Capacity limits.
    pub limits: LimitsConfig,
    /// Timeout values.
    pub timeouts: TimeoutConfig,
    /// Logging configuration.
    pub tracing: TracingConfig,
}

/// Settings the broker loop is constructed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Bounded wait for each channel poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// The segment a worker sends to announce it is ready.
    pub ready_marker: String,
}

/// Inputs to the simulation harness. The broker loop never reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of concurrent client sessions.
    pub clients: usize,
    /// Number of concurrent worker sessions.
    pub workers: usize,
    /// Request/reply cycles each client performs.
    pub requests_per_client: usize,
    /// Address the client-facing router binds.
    pub frontend: String,
    /// Address the worker-facing router binds.
    pub backend: String,
    /// Payload every client sends.
    pub request_payload: String,
    /// Payload every worker replies with.
    pub reply_payload: String,
}

/// Channel capacity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Capacity of every router inbox and peer inbox.
    pub channel_capacity: usize,
}

/// Timeout values, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on broker and worker shutdown.
    pub shutdown_timeout_ms: u64,
    /// How long a client waits for a single reply.
    pub client_reply_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a file in this directory.
    pub log_directory: Option<PathBuf>,
    /// File name used inside `log_directory`.
    pub log_file: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1_000,
            ready_marker: "READY".to_string(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            clients: 10,
            workers: 3,
            requests_per_client: 1,
            frontend: "inproc://frontend".to_string(),
            backend: "inproc://backend".to_string(),
            request_payload: "HELLO".to_string(),
            reply_payload: "OK".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 255,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 10_000,
            client_reply_timeout_ms: 30_000,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_directory: None,
            log_file: "loadbroker.log".to_string(),
        }
    }
}

impl LoadBrokerConfig {
    /// Bounded wait used for each broker poll.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.poll_timeout_ms)
    }

    /// Upper bound on shutdown of the broker and its workers.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.shutdown_timeout_ms)
    }

    /// How long a client waits for each reply.
    #[must_use]
    pub const fn client_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.client_reply_timeout_ms)
    }

    /// The ready marker as a wire segment.
    #[must_use]
    pub fn ready_marker(&self) -> Bytes {
        Bytes::from(self.broker.ready_marker.clone())
    }

    /// Total requests the harness will issue, saturating at `usize::MAX`.
    ///
    /// [`validate`](Self::validate) rejects configurations where it would saturate.
    #[must_use]
    pub const fn total_requests(&self) -> usize {
        self.harness.clients.saturating_mul(self.harness.requests_per_client)
    }

    /// Parses configuration from a TOML string without falling back to defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the TOML does not fit the schema.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Reads configuration from `path` without falling back to defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks that the values describe a runnable system.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let marker = self.broker.ready_marker.as_bytes();
        if marker.is_empty() {
            return Err(ConfigError::Invalid("broker.ready_marker must not be empty".into()));
        }
        if marker[0] == ASSIGNED_IDENTITY_PREFIX {
            return Err(ConfigError::Invalid(
                "broker.ready_marker must not start with a zero byte".into(),
            ));
        }
        if self.harness.workers == 0 {
            return Err(ConfigError::Invalid("harness.workers must be at least 1".into()));
        }
        if self
            .harness
            .clients
            .checked_mul(self.harness.requests_per_client)
            .is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "harness.clients ({}) times harness.requests_per_client ({}) overflows",
                self.harness.clients, self.harness.requests_per_client
            )));
        }
        if self.limits.channel_capacity == 0 {
            return Err(ConfigError::Invalid("limits.channel_capacity must be at least 1".into()));
        }
        if self.harness.frontend == self.harness.backend {
            return Err(ConfigError::Invalid(format!(
                "harness.frontend and harness.backend are both {}",
                self.harness.frontend
            )));
        }
        Ok(())
    }

    /// Loads configuration from XDG-compliant locations.
    ///
    /// Looks for `loadbroker/config.toml` under `$XDG_CONFIG_HOME` and then the
    /// system config directories. If no file is found, returns the defaults.
    /// If a file exists but cannot be read or parsed, logs an error and returns
    /// the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("loadbroker") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => {
                info!("Successfully loaded configuration");
                config
            }
            Err(e) => {
                error!("{e}; using defaults");
                Self::default()
            }
        }
    }
}

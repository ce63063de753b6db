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

// --- Public Re-exports ---
pub use app::{HarnessReport, LoadBrokerApp};
pub use broker_handle::BrokerHandle;
pub use broker_loop::{BrokerError, BrokerLoop, BrokerSettings, Side, Step};
pub use broker_stats::{BrokerStats, BrokerStatsSnapshot};
pub use config::{
    BrokerConfig, ConfigError, HarnessConfig, LimitsConfig, LoadBrokerConfig, TimeoutConfig,
    TracingConfig,
};
pub use logging::initialize_tracing;

// --- Submodules ---

/// Defines `LoadBrokerApp`, which runs a broker with simulated clients and workers.
mod app;
/// Defines the handle to a spawned broker loop.
mod broker_handle;
/// Defines the routing loop.
mod broker_loop;
/// Defines the broker's counters.
mod broker_stats;
/// Defines the configuration system.
pub mod config;
/// Defines subscriber setup.
mod logging;

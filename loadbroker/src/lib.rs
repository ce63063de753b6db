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

#![forbid(unsafe_code)]
#![forbid(missing_docs)]

//! # Loadbroker
//!
//! A load-balancing request/reply broker. Clients send requests to the
//! frontend, workers announce themselves on the backend, and the broker hands
//! each request to whichever worker has been idle longest, then carries the
//! reply back to the client that asked.
//!
//! ## Key Concepts
//!
//! - **Broker (`BrokerLoop`)**: single-task routing loop over two
//!   [`Channel`](loadbroker_core::traits::Channel)s. The frontend is only read
//!   while some worker is idle, so unserved requests wait in the transport.
//! - **Handle (`BrokerHandle`)**: stop, observe, and join a spawned loop.
//! - **Sessions (`ClientSession`, `WorkerSession`)**: strict request/reply
//!   peers driven over a `RequestSocket`.
//! - **Harness (`LoadBrokerApp`)**: wires a broker to N clients and M workers
//!   and reports what happened.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loadbroker::prelude::*;
//!
//! let mut config = LoadBrokerConfig::load();
//! config.harness.clients = 4;
//! let report = LoadBrokerApp::launch(config).await?;
//! assert_eq!(report.pending, Some(0));
//! ```

/// Broker loop, handle, configuration, and harness.
pub(crate) mod common;

/// Simulated client and worker peers.
pub(crate) mod session;

pub use common::initialize_tracing;

/// Configuration types, loaded from TOML.
pub mod config {
    pub use crate::common::config::*;
}

/// A prelude module for conveniently importing the most commonly used items.
///
/// Re-exports the broker, its handle and settings, the sessions, the harness,
/// the configuration types, and the routing primitives from `loadbroker-core`.
pub mod prelude {
    pub use loadbroker_core::prelude::*;

    pub use crate::common::{
        BrokerError, BrokerHandle, BrokerLoop, BrokerSettings, BrokerStats, BrokerStatsSnapshot,
        ConfigError, HarnessReport, LoadBrokerApp, LoadBrokerConfig, Side, Step, TracingConfig,
    };
    pub use crate::session::{echo, reply_with, ClientSession, SessionError, WorkerSession};
}

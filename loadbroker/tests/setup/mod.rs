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
#![allow(dead_code)]

use std::sync::Once;

use loadbroker::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Sends every test's trace output to `logs/loadbroker_tests.txt`.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "loadbroker_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("trace")
            .add_directive("loadbroker::common::broker_loop=trace".parse().unwrap())
            .add_directive("loadbroker::session=debug".parse().unwrap())
            .add_directive("loadbroker_core=debug".parse().unwrap())
            .add_directive("tokio=info".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// A harness configuration with short timeouts, suitable for tests.
pub fn quick_config(clients: usize, workers: usize, requests_per_client: usize) -> LoadBrokerConfig {
    let mut config = LoadBrokerConfig::default();
    config.harness.clients = clients;
    config.harness.workers = workers;
    config.harness.requests_per_client = requests_per_client;
    config.broker.poll_timeout_ms = 20;
    config.timeouts.shutdown_timeout_ms = 2_000;
    config.timeouts.client_reply_timeout_ms = 5_000;
    config
}

/// Broker settings with a short poll, suitable for tests.
pub fn quick_settings() -> BrokerSettings {
    BrokerSettings {
        poll_timeout: std::time::Duration::from_millis(20),
        ..BrokerSettings::default()
    }
}

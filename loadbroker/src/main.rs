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
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use loadbroker::initialize_tracing;
use loadbroker::prelude::*;
use tracing::info;

/// Run a load-balancing broker with simulated clients and workers.
#[derive(Debug, Parser)]
#[command(name = "loadbroker", version, about)]
struct Cli {
    /// Number of concurrent clients.
    #[arg(long)]
    clients: Option<usize>,

    /// Number of concurrent workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Request/reply cycles each client performs.
    #[arg(long)]
    requests_per_client: Option<usize>,

    /// Bounded wait for each broker poll, in milliseconds.
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// Address the client-facing router binds.
    #[arg(long)]
    frontend: Option<String>,

    /// Address the worker-facing router binds.
    #[arg(long)]
    backend: Option<String>,

    /// Configuration file to use instead of the XDG location.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<LoadBrokerConfig> {
        let mut config = match &self.config {
            Some(path) => LoadBrokerConfig::load_from(path)?,
            None => LoadBrokerConfig::load(),
        };
        if let Some(clients) = self.clients {
            config.harness.clients = clients;
        }
        if let Some(workers) = self.workers {
            config.harness.workers = workers;
        }
        if let Some(cycles) = self.requests_per_client {
            config.harness.requests_per_client = cycles;
        }
        if let Some(poll_timeout_ms) = self.poll_timeout_ms {
            config.broker.poll_timeout_ms = poll_timeout_ms;
        }
        if let Some(frontend) = self.frontend {
            config.harness.frontend = frontend;
        }
        if let Some(backend) = self.backend {
            config.harness.backend = backend;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    initialize_tracing(&config.tracing);
    info!("** loadbroker startup **");

    let report = LoadBrokerApp::launch(config).await?;

    for (client, replies) in &report.client_replies {
        let last = replies
            .last()
            .map(|reply| {
                reply
                    .iter()
                    .map(|segment| String::from_utf8_lossy(segment).into_owned())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .unwrap_or_default();
        info!(%client, replies = replies.len(), %last, "client");
    }
    for (worker, served) in &report.worker_served {
        info!(%worker, served, "worker");
    }
    info!(
        idle = report.final_availability.len(),
        distinct_workers = report.distinct_workers,
        stats = ?report.stats,
        "broker"
    );
    Ok(())
}

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

use std::time::Duration;

use anyhow::{anyhow, Context as _};
use bytes::Bytes;
use futures::future::join_all;
use loadbroker_core::message::Identity;
use loadbroker_core::transport::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::common::{BrokerLoop, BrokerSettings, BrokerStatsSnapshot, LoadBrokerConfig};
use crate::session::{reply_with, ClientSession, WorkerSession};

const READINESS_POLL: Duration = Duration::from_millis(5);

/// What a harness run produced.
#[derive(Debug, Clone)]
pub struct HarnessReport {
    /// Each client's identity and the replies it received, in client start order.
    pub client_replies: Vec<(Identity, Vec<Vec<Bytes>>)>,
    /// Each worker's identity and how many requests it served.
    pub worker_served: Vec<(Identity, usize)>,
    /// Idle workers when the broker finished, head first.
    pub final_availability: Vec<Identity>,
    /// Replies the broker still expected when it finished.
    pub pending: Option<usize>,
    /// Distinct worker identities the broker ever saw.
    pub distinct_workers: usize,
    /// Broker counters at the end of the run.
    pub stats: BrokerStatsSnapshot,
}

impl HarnessReport {
    /// Replies received across all clients.
    #[must_use]
    pub fn total_replies(&self) -> usize {
        self.client_replies.iter().map(|(_, replies)| replies.len()).sum()
    }

    /// Requests served across all workers.
    #[must_use]
    pub fn total_served(&self) -> usize {
        self.worker_served.iter().map(|(_, served)| served).sum()
    }
}

/// Runs a broker together with a pool of simulated clients and workers.
///
/// # Examples
///
/// ```rust,ignore
/// let report = LoadBrokerApp::launch(LoadBrokerConfig::default()).await?;
/// assert_eq!(report.total_replies(), 10);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadBrokerApp;

impl LoadBrokerApp {
    /// Binds both routers, starts the broker, and runs every client to completion.
    ///
    /// The broker stops once it has routed one reply per request. Workers are
    /// then cancelled and joined within `timeouts.shutdown_timeout_ms`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, an address cannot be bound, a
    /// client session fails, or the broker or its workers fail to stop.
    #[instrument(skip_all, fields(clients = config.harness.clients, workers = config.harness.workers))]
    pub async fn launch(config: LoadBrokerConfig) -> anyhow::Result<HarnessReport> {
        config.validate()?;
        let harness = &config.harness;
        let shutdown_timeout = config.shutdown_timeout();

        let context = Context::new();
        let capacity = config.limits.channel_capacity;
        let frontend = context
            .bind(&harness.frontend, capacity)
            .with_context(|| format!("binding frontend at {}", harness.frontend))?;
        let backend = context
            .bind(&harness.backend, capacity)
            .with_context(|| format!("binding backend at {}", harness.backend))?;

        let total = config.total_requests();
        let settings = BrokerSettings::from_config(&config).with_request_limit(total);
        let shutdown = CancellationToken::new();
        let broker = BrokerLoop::new(frontend, backend, settings)
            .with_cancellation(shutdown.clone())
            .spawn();
        let worker_cancel = shutdown.child_token();
        info!(total, "broker started");

        let mut workers = Vec::with_capacity(harness.workers);
        for _ in 0..harness.workers {
            let socket = context.connect(&harness.backend)?;
            let identity = socket.identity().clone();
            let session = WorkerSession::new(socket, config.ready_marker());
            let handler = reply_with(harness.reply_payload.clone());
            workers.push((identity, tokio::spawn(session.run(handler, worker_cancel.clone()))));
        }

        if total > 0 {
            Self::await_readiness(&broker.stats(), harness.workers, shutdown_timeout).await;
        }

        let payload = vec![Bytes::from(harness.request_payload.clone())];
        let mut clients = Vec::with_capacity(harness.clients);
        for _ in 0..harness.clients {
            let socket = context.connect(&harness.frontend)?;
            let identity = socket.identity().clone();
            let payload = payload.clone();
            let cycles = harness.requests_per_client;
            let reply_timeout = config.client_reply_timeout();
            clients.push((
                identity,
                tokio::spawn(async move {
                    let mut session = ClientSession::new(socket);
                    session.run(&payload, cycles, reply_timeout).await
                }),
            ));
        }

        let mut client_replies = Vec::with_capacity(clients.len());
        let mut client_failure = None;
        for (identity, outcome) in join_all(
            clients
                .into_iter()
                .map(|(identity, task)| async move { (identity, task.await) }),
        )
        .await
        {
            match outcome {
                Ok(Ok(replies)) => {
                    debug!(client = %identity, replies = replies.len(), "client finished");
                    client_replies.push((identity, replies));
                }
                Ok(Err(e)) => {
                    warn!(client = %identity, error = %e, "client failed");
                    client_failure.get_or_insert(anyhow!("client {identity} failed: {e}"));
                }
                Err(e) => {
                    client_failure.get_or_insert(anyhow!("client {identity} task failed: {e}"));
                }
            }
        }

        let broker_outcome = broker.shutdown(shutdown_timeout).await;
        let worker_served = Self::stop_workers(workers, &worker_cancel, shutdown_timeout).await?;

        if let Some(failure) = client_failure {
            return Err(failure);
        }
        let broker = broker_outcome?;

        let report = HarnessReport {
            client_replies,
            worker_served,
            final_availability: broker.availability().iter().cloned().collect(),
            pending: broker.pending(),
            distinct_workers: broker.known_workers().len(),
            stats: broker.stats().snapshot(),
        };
        info!(
            replies = report.total_replies(),
            idle = report.final_availability.len(),
            "harness finished"
        );
        Ok(report)
    }

    /// Waits until `workers` ready announcements have been accepted, or `limit` elapses.
    async fn await_readiness(stats: &crate::common::BrokerStats, workers: usize, limit: Duration) {
        let ready = async {
            while stats.snapshot().ready_announcements < workers {
                tokio::time::sleep(READINESS_POLL).await;
            }
        };
        if tokio::time::timeout(limit, ready).await.is_err() {
            warn!(workers, "not every worker announced readiness in time");
        }
    }

    async fn stop_workers(
        workers: Vec<(Identity, tokio::task::JoinHandle<Result<usize, crate::session::SessionError>>)>,
        cancel: &CancellationToken,
        limit: Duration,
    ) -> anyhow::Result<Vec<(Identity, usize)>> {
        cancel.cancel();
        let joined = tokio::time::timeout(
            limit,
            join_all(
                workers
                    .into_iter()
                    .map(|(identity, task)| async move { (identity, task.await) }),
            ),
        )
        .await
        .map_err(|_| anyhow!("workers did not stop within {limit:?}"))?;

        let mut served = Vec::with_capacity(joined.len());
        for (identity, outcome) in joined {
            let count = outcome
                .with_context(|| format!("worker {identity} task failed"))?
                .with_context(|| format!("worker {identity} failed"))?;
            debug!(worker = %identity, served = count, "worker finished");
            served.push((identity, count));
        }
        Ok(served)
    }
}

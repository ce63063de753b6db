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

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use loadbroker_core::common::{AvailabilityQueue, Enqueued};
use loadbroker_core::message::{Envelope, Identity};
use loadbroker_core::traits::Channel;
use loadbroker_core::transport::TransportError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{BrokerStats, LoadBrokerConfig};

/// Which of the broker's two channels an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The client-facing channel.
    Frontend,
    /// The worker-facing channel.
    Backend,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frontend => f.write_str("frontend"),
            Self::Backend => f.write_str("backend"),
        }
    }
}

/// Errors that end a broker run.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A channel failed in a way it cannot recover from.
    #[error("{side} channel failed: {source}")]
    Transport {
        /// The channel that failed.
        side: Side,
        /// What the transport reported.
        #[source]
        source: TransportError,
    },
    /// The loop did not finish within the shutdown bound.
    #[error("broker did not stop within {0:?}")]
    ShutdownTimeout(Duration),
    /// The task running the loop panicked or was aborted.
    #[error("broker task failed: {0}")]
    Task(String),
}

/// Values the loop is constructed with.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Bounded wait for each channel poll.
    pub poll_timeout: Duration,
    /// The segment a worker sends to announce readiness.
    pub ready_marker: Bytes,
    /// Stop after this many replies have been routed. `None` runs until stopped.
    pub request_limit: Option<usize>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1_000),
            ready_marker: Bytes::from_static(b"READY"),
            request_limit: None,
        }
    }
}

impl BrokerSettings {
    /// Settings for an unbounded run using the configured timeout and marker.
    #[must_use]
    pub fn from_config(config: &LoadBrokerConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout(),
            ready_marker: config.ready_marker(),
            request_limit: None,
        }
    }

    /// Sets the number of replies after which the loop stops.
    #[must_use]
    pub const fn with_request_limit(mut self, limit: usize) -> Self {
        self.request_limit = Some(limit);
        self
    }
}

/// Result of a single [`BrokerLoop::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The iteration ran; call `step` again.
    Continue,
    /// The cancellation token fired.
    Stopped,
    /// The pending-request counter reached zero.
    LimitReached,
}

/// What became of an envelope handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    /// The destination was gone or not reading.
    Dropped,
    /// A stop was requested before the send finished.
    Cancelled,
}

/// The routing core: moves requests from clients to idle workers and replies
/// back to the clients that sent them.
///
/// Each iteration polls the worker-facing channel unconditionally and then
/// polls the client-facing channel only when some worker is idle. A client
/// request is therefore never accepted unless it can be forwarded at once;
/// until then it waits in the frontend channel's own buffer.
///
/// The loop owns all routing state and runs on a single task, so nothing in
/// it is locked.
///
/// Worker-facing envelopes look like:
///
/// ```text
/// [worker, "", READY]                    ready announcement
/// [worker, "", client, "", reply...]     reply to route back
/// ```
///
/// and client-facing ones like `[client, "", request...]`.
pub struct BrokerLoop<F, B> {
    frontend: F,
    backend: B,
    settings: BrokerSettings,
    availability: AvailabilityQueue,
    known_workers: HashSet<Identity>,
    pending: Option<usize>,
    stats: Arc<BrokerStats>,
    cancellation_token: CancellationToken,
}

impl<F, B> fmt::Debug for BrokerLoop<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerLoop")
            .field("settings", &self.settings)
            .field("availability", &self.availability)
            .field("pending", &self.pending)
            .field("stopped", &self.cancellation_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<F: Channel, B: Channel> BrokerLoop<F, B> {
    /// Creates a loop over two already-bound channels.
    pub fn new(frontend: F, backend: B, settings: BrokerSettings) -> Self {
        let pending = settings.request_limit;
        Self {
            frontend,
            backend,
            settings,
            availability: AvailabilityQueue::new(),
            known_workers: HashSet::new(),
            pending,
            stats: Arc::new(BrokerStats::new()),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Replaces the token the loop checks for a stop request.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Idle workers, head first.
    #[must_use]
    pub const fn availability(&self) -> &AvailabilityQueue {
        &self.availability
    }

    /// Distinct worker identities marked idle during a bounded run, less those
    /// found disconnected. Not tracked when no request limit is set.
    #[must_use]
    pub const fn known_workers(&self) -> &HashSet<Identity> {
        &self.known_workers
    }

    /// Replies still expected before the request limit is reached, if one is set.
    #[must_use]
    pub const fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<BrokerStats> {
        self.stats.clone()
    }

    /// Runs until stopped, until the request limit is reached, or until a
    /// channel fails.
    ///
    /// # Errors
    ///
    /// [`BrokerError::Transport`] when a channel reports a fatal error. The
    /// cancellation token is cancelled first so sessions sharing it can wind
    /// down.
    #[instrument(skip_all, name = "broker_loop")]
    pub async fn run(&mut self) -> Result<(), BrokerError> {
        debug!(poll_timeout = ?self.settings.poll_timeout, limit = ?self.pending, "broker loop started");
        loop {
            match self.step().await? {
                Step::Continue => {}
                Step::Stopped => {
                    debug!("broker loop stopped on request");
                    break;
                }
                Step::LimitReached => {
                    debug!("broker loop answered every request");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Runs one iteration: the backend poll, then the frontend poll if a
    /// worker is idle.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn step(&mut self) -> Result<Step, BrokerError> {
        if self.cancellation_token.is_cancelled() {
            return Ok(Step::Stopped);
        }
        if self.pending == Some(0) {
            return Ok(Step::LimitReached);
        }

        let Some(inbound) = self.poll(Side::Backend).await? else {
            return Ok(Step::Stopped);
        };
        if let Some(envelope) = inbound {
            self.handle_backend(envelope).await?;
            if self.pending == Some(0) {
                return Ok(Step::LimitReached);
            }
        }

        if !self.availability.is_empty() {
            let Some(inbound) = self.poll(Side::Frontend).await? else {
                return Ok(Step::Stopped);
            };
            if let Some(envelope) = inbound {
                self.handle_frontend(envelope).await?;
            }
        }

        Ok(Step::Continue)
    }

    /// Receives from one side with the bounded wait.
    ///
    /// The outer `None` means a stop was requested during the wait; the inner
    /// `None` means the wait elapsed.
    async fn poll(&mut self, side: Side) -> Result<Option<Option<Envelope>>, BrokerError> {
        let timeout = self.settings.poll_timeout;
        BrokerStats::bump(match side {
            Side::Frontend => &self.stats.frontend_polls,
            Side::Backend => &self.stats.backend_polls,
        });
        let channel: &mut dyn Channel = match side {
            Side::Frontend => &mut self.frontend,
            Side::Backend => &mut self.backend,
        };

        let received = tokio::select! {
            biased;
            () = self.cancellation_token.cancelled() => return Ok(None),
            received = channel.try_receive(timeout) => received,
        };

        match received {
            Ok(envelope) => Ok(Some(envelope)),
            Err(source) if source.is_fatal() => Err(self.fail(side, source)),
            Err(source) => {
                warn!(%side, error = %source, "receive failed; continuing");
                Ok(Some(None))
            }
        }
    }

    async fn handle_backend(&mut self, envelope: Envelope) -> Result<(), BrokerError> {
        let (worker, body) = match envelope.strip_address() {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "dropping malformed worker message");
                BrokerStats::bump(&self.stats.malformed_dropped);
                return Ok(());
            }
        };

        let enqueued = self.mark_idle(worker.clone());

        // A reply carries a client address and its delimiter, so a client
        // whose identity equals the marker is still routed as a reply.
        let addressed = body.get(1).is_some_and(Bytes::is_empty);
        if !addressed && body.front() == Some(&self.settings.ready_marker) {
            if body.len() == 1 {
                if enqueued == Enqueued::Added {
                    BrokerStats::bump(&self.stats.ready_announcements);
                }
                debug!(%worker, idle = self.availability.len(), "worker ready");
            } else {
                warn!(%worker, extra = body.len() - 1, "ready announcement has trailing segments; ignoring them");
                BrokerStats::bump(&self.stats.malformed_dropped);
            }
            return Ok(());
        }

        let (client, reply) = match body.strip_address() {
            Ok(parts) => parts,
            Err(e) => {
                warn!(%worker, error = %e, "dropping worker reply without a client address");
                BrokerStats::bump(&self.stats.malformed_dropped);
                return Ok(());
            }
        };

        trace!(%worker, %client, "routing reply");
        let delivery = self
            .forward(Side::Frontend, Envelope::wrap_address(client, reply))
            .await?;
        if delivery == Delivery::Sent {
            BrokerStats::bump(&self.stats.replies_routed);
        }
        if let Some(pending) = self.pending.as_mut() {
            *pending = pending.saturating_sub(1);
        }
        Ok(())
    }

    async fn handle_frontend(&mut self, envelope: Envelope) -> Result<(), BrokerError> {
        let (client, request) = match envelope.strip_address() {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "dropping malformed client request");
                BrokerStats::bump(&self.stats.malformed_dropped);
                return Ok(());
            }
        };

        // A worker that left while idle is only discovered here; the request
        // moves on to the next idle worker.
        while let Some(worker) = self.availability.dequeue_head() {
            trace!(%client, %worker, idle = self.availability.len(), "dispatching request");
            let routed = Envelope::wrap_address(
                worker.clone(),
                Envelope::wrap_address(client.clone(), request.clone()),
            );
            match self.forward(Side::Backend, routed).await? {
                Delivery::Sent => {
                    BrokerStats::bump(&self.stats.requests_dispatched);
                    return Ok(());
                }
                Delivery::Cancelled => return Ok(()),
                Delivery::Dropped => {
                    self.known_workers.remove(&worker);
                    debug!(%worker, idle = self.availability.len(), "worker unreachable; trying the next one");
                }
            }
        }

        warn!(%client, "no reachable idle worker; dropping request");
        BrokerStats::bump(&self.stats.requests_dropped);
        Ok(())
    }

    fn mark_idle(&mut self, worker: Identity) -> Enqueued {
        if self.pending.is_some() {
            self.known_workers.insert(worker.clone());
        }
        let enqueued = self.availability.enqueue(worker.clone());
        if enqueued == Enqueued::Duplicate {
            warn!(%worker, "worker announced readiness while already idle");
            BrokerStats::bump(&self.stats.duplicate_ready);
        }
        enqueued
    }

    /// Sends on one side without outliving a stop request.
    async fn forward(&self, side: Side, envelope: Envelope) -> Result<Delivery, BrokerError> {
        let channel: &dyn Channel = match side {
            Side::Frontend => &self.frontend,
            Side::Backend => &self.backend,
        };

        let sent = tokio::select! {
            biased;
            () = self.cancellation_token.cancelled() => {
                debug!(%side, "stop requested during send; dropping message");
                return Ok(Delivery::Cancelled);
            }
            sent = channel.try_send(envelope) => sent,
        };

        match sent {
            Ok(()) => Ok(Delivery::Sent),
            Err(source) if source.is_fatal() => Err(self.fail(side, source)),
            Err(TransportError::Unroutable(peer)) => {
                warn!(%side, %peer, "destination disconnected; dropping message");
                BrokerStats::bump(&self.stats.unroutable_dropped);
                Ok(Delivery::Dropped)
            }
            Err(TransportError::PeerFull(peer)) => {
                warn!(%side, %peer, "destination is not reading; dropping message");
                BrokerStats::bump(&self.stats.backpressure_dropped);
                Ok(Delivery::Dropped)
            }
            Err(source) => {
                warn!(%side, error = %source, "send rejected; dropping message");
                BrokerStats::bump(&self.stats.malformed_dropped);
                Ok(Delivery::Dropped)
            }
        }
    }

    fn fail(&self, side: Side, source: TransportError) -> BrokerError {
        error!(%side, error = %source, "channel failed; shutting down broker");
        self.cancellation_token.cancel();
        BrokerError::Transport { side, source }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    /// Channel double fed from a script and recording everything sent.
    #[derive(Clone, Default)]
    struct Script {
        inbound: Arc<Mutex<VecDeque<Envelope>>>,
        sent: Arc<Mutex<Vec<Envelope>>>,
        receives: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
        stalled: Arc<AtomicBool>,
    }

    impl Script {
        fn push(&self, envelope: Envelope) {
            self.inbound.lock().push_back(envelope);
        }

        fn sent(&self) -> Vec<Envelope> {
            self.sent.lock().clone()
        }

        fn receives(&self) -> usize {
            self.receives.load(Ordering::SeqCst)
        }
    }

    struct ScriptedChannel(Script);

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn try_send(&self, envelope: Envelope) -> Result<(), TransportError> {
            if self.0.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.0.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if envelope.front() == Some(&Bytes::from_static(b"ghost")) {
                return Err(TransportError::Unroutable(Identity::from("ghost")));
            }
            if envelope.front() == Some(&Bytes::from_static(b"slow")) {
                return Err(TransportError::PeerFull(Identity::from("slow")));
            }
            self.0.sent.lock().push(envelope);
            Ok(())
        }

        async fn try_receive(&mut self, _timeout: Duration) -> Result<Option<Envelope>, TransportError> {
            self.0.receives.fetch_add(1, Ordering::SeqCst);
            if self.0.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            Ok(self.0.inbound.lock().pop_front())
        }
    }

    fn broker(limit: Option<usize>) -> (BrokerLoop<ScriptedChannel, ScriptedChannel>, Script, Script) {
        let frontend = Script::default();
        let backend = Script::default();
        let settings = BrokerSettings {
            poll_timeout: Duration::from_millis(5),
            request_limit: limit,
            ..BrokerSettings::default()
        };
        let broker = BrokerLoop::new(
            ScriptedChannel(frontend.clone()),
            ScriptedChannel(backend.clone()),
            settings,
        );
        (broker, frontend, backend)
    }

    fn ready(worker: &'static str) -> Envelope {
        Envelope::wrap_address(Identity::from(worker), Envelope::from_payload(["READY"]))
    }

    fn request(client: &'static str, payload: &'static str) -> Envelope {
        Envelope::wrap_address(Identity::from(client), Envelope::from_payload([payload]))
    }

    fn reply(worker: &'static str, client: &'static str, payload: &'static str) -> Envelope {
        Envelope::wrap_address(Identity::from(worker), request(client, payload))
    }

    fn queued(broker: &BrokerLoop<ScriptedChannel, ScriptedChannel>) -> Vec<Identity> {
        broker.availability().iter().cloned().collect()
    }

    #[tokio::test]
    async fn dispatches_to_workers_in_the_order_they_became_idle() {
        let (mut broker, frontend, backend) = broker(None);
        for worker in ["w1", "w2", "w3"] {
            backend.push(ready(worker));
        }
        for _ in 0..3 {
            assert_eq!(broker.step().await.unwrap(), Step::Continue);
        }
        assert_eq!(
            queued(&broker),
            vec![Identity::from("w1"), Identity::from("w2"), Identity::from("w3")]
        );

        for client in ["c1", "c2", "c3"] {
            frontend.push(request(client, "job"));
        }
        for _ in 0..3 {
            broker.step().await.unwrap();
        }

        let dispatched: Vec<_> = backend
            .sent()
            .into_iter()
            .map(|e| e.strip_address().unwrap())
            .map(|(worker, rest)| (worker, rest.strip_address().unwrap().0))
            .collect();
        assert_eq!(
            dispatched,
            vec![
                (Identity::from("w1"), Identity::from("c1")),
                (Identity::from("w2"), Identity::from("c2")),
                (Identity::from("w3"), Identity::from("c3")),
            ]
        );
        assert!(broker.availability().is_empty());
    }

    #[tokio::test]
    async fn frontend_is_not_polled_without_an_idle_worker() {
        let (mut broker, frontend, backend) = broker(None);
        frontend.push(request("c1", "job"));

        for _ in 0..5 {
            broker.step().await.unwrap();
        }
        assert_eq!(frontend.receives(), 0);
        assert_eq!(backend.receives(), 5);
        assert_eq!(broker.stats().snapshot().frontend_polls, 0);

        backend.push(ready("w1"));
        broker.step().await.unwrap();
        assert_eq!(frontend.receives(), 1);
        assert_eq!(
            backend.sent(),
            vec![Envelope::wrap_address(Identity::from("w1"), request("c1", "job"))]
        );
    }

    #[tokio::test]
    async fn reply_is_routed_to_the_originating_client() {
        let (mut broker, frontend, backend) = broker(Some(1));
        backend.push(ready("w1"));
        frontend.push(request("c1", "Hello"));
        assert_eq!(broker.step().await.unwrap(), Step::Continue);
        assert!(broker.availability().is_empty());

        backend.push(reply("w1", "c1", "OK"));
        assert_eq!(broker.step().await.unwrap(), Step::LimitReached);

        assert_eq!(frontend.sent(), vec![request("c1", "OK")]);
        assert_eq!(broker.availability().len(), 1);
        assert_eq!(broker.pending(), Some(0));
        let stats = broker.stats().snapshot();
        assert_eq!(stats.requests_dispatched, 1);
        assert_eq!(stats.replies_routed, 1);
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_and_the_loop_continues() {
        let (mut broker, frontend, backend) = broker(None);
        backend.push(Envelope::from_payload(["w1", "READY"]));
        broker.step().await.unwrap();
        assert!(broker.availability().is_empty());
        assert_eq!(broker.stats().snapshot().malformed_dropped, 1);

        backend.push(ready("w1"));
        frontend.push(Envelope::from_payload(["c1", "no-delimiter"]));
        broker.step().await.unwrap();
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
        assert_eq!(broker.stats().snapshot().malformed_dropped, 2);

        frontend.push(request("c2", "job"));
        broker.step().await.unwrap();
        assert_eq!(
            backend.sent(),
            vec![Envelope::wrap_address(Identity::from("w1"), request("c2", "job"))]
        );
    }

    #[tokio::test]
    async fn reply_without_client_address_is_dropped_but_worker_returns() {
        let (mut broker, frontend, backend) = broker(None);
        backend.push(Envelope::wrap_address(
            Identity::from("w1"),
            Envelope::from_payload(["c1", "OK"]),
        ));
        broker.step().await.unwrap();
        assert!(frontend.sent().is_empty());
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
        assert_eq!(broker.stats().snapshot().malformed_dropped, 1);
    }

    #[tokio::test]
    async fn duplicate_ready_does_not_duplicate_the_worker() {
        let (mut broker, _frontend, backend) = broker(None);
        backend.push(ready("w1"));
        backend.push(ready("w1"));
        broker.step().await.unwrap();
        broker.step().await.unwrap();
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
        let stats = broker.stats().snapshot();
        assert_eq!(stats.ready_announcements, 1);
        assert_eq!(stats.duplicate_ready, 1);
    }

    #[tokio::test]
    async fn ready_with_trailing_segments_queues_worker_and_forwards_nothing() {
        let (mut broker, frontend, backend) = broker(None);
        backend.push(Envelope::wrap_address(
            Identity::from("w1"),
            Envelope::from_payload(["READY", "junk"]),
        ));
        broker.step().await.unwrap();
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
        assert!(frontend.sent().is_empty());
        let stats = broker.stats().snapshot();
        assert_eq!(stats.malformed_dropped, 1);
        assert_eq!(stats.ready_announcements, 0);
    }

    #[tokio::test]
    async fn reply_to_departed_client_is_counted_and_skipped() {
        let (mut broker, frontend, backend) = broker(Some(2));
        backend.push(reply("w1", "ghost", "OK"));
        assert_eq!(broker.step().await.unwrap(), Step::Continue);
        assert!(frontend.sent().is_empty());
        assert_eq!(broker.pending(), Some(1));
        assert_eq!(broker.stats().snapshot().unroutable_dropped, 1);
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
    }

    #[tokio::test]
    async fn stop_signal_ends_the_run() {
        let (mut broker, _frontend, backend) = broker(None);
        let token = broker.cancellation_token();
        token.cancel();
        assert_eq!(broker.step().await.unwrap(), Step::Stopped);
        broker.run().await.unwrap();
        assert_eq!(backend.receives(), 0);
    }

    #[tokio::test]
    async fn closed_channel_is_fatal_and_cancels() {
        let (mut broker, _frontend, backend) = broker(None);
        backend.closed.store(true, Ordering::SeqCst);
        let token = broker.cancellation_token();

        let result = broker.run().await;
        assert!(matches!(
            result,
            Err(BrokerError::Transport {
                side: Side::Backend,
                source: TransportError::Closed
            })
        ));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn known_workers_never_exceed_the_pool() {
        let (mut broker, frontend, backend) = broker(Some(4));
        backend.push(ready("w1"));
        backend.push(ready("w2"));
        broker.step().await.unwrap();
        broker.step().await.unwrap();
        for client in ["c1", "c2", "c3", "c4"] {
            frontend.push(request(client, "job"));
        }
        // Each worker serves two requests.
        for (worker, client) in [("w1", "c1"), ("w2", "c2"), ("w1", "c3"), ("w2", "c4")] {
            broker.step().await.unwrap();
            backend.push(reply(worker, client, "OK"));
        }
        while broker.step().await.unwrap() == Step::Continue {}

        assert_eq!(broker.known_workers().len(), 2);
        assert_eq!(broker.availability().len(), 2);
        assert_eq!(broker.pending(), Some(0));
        assert_eq!(frontend.sent().len(), 4);
    }

    #[tokio::test]
    async fn client_named_like_the_ready_marker_still_gets_its_reply() {
        let (mut broker, frontend, backend) = broker(Some(1));
        backend.push(ready("w1"));
        frontend.push(request("READY", "Hello"));
        broker.step().await.unwrap();

        backend.push(reply("w1", "READY", "OK"));
        assert_eq!(broker.step().await.unwrap(), Step::LimitReached);

        assert_eq!(frontend.sent(), vec![request("READY", "OK")]);
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
        let stats = broker.stats().snapshot();
        assert_eq!(stats.replies_routed, 1);
        assert_eq!(stats.malformed_dropped, 0);
        assert_eq!(stats.ready_announcements, 1);
    }

    #[tokio::test]
    async fn departed_idle_worker_hands_the_request_to_the_next_one() {
        let (mut broker, frontend, backend) = broker(Some(1));
        backend.push(ready("ghost"));
        backend.push(ready("w2"));
        broker.step().await.unwrap();
        broker.step().await.unwrap();
        assert_eq!(broker.known_workers().len(), 2);

        frontend.push(request("c1", "job"));
        broker.step().await.unwrap();

        assert_eq!(
            backend.sent(),
            vec![Envelope::wrap_address(Identity::from("w2"), request("c1", "job"))]
        );
        assert!(broker.availability().is_empty());
        assert!(!broker.known_workers().contains(&Identity::from("ghost")));
        let stats = broker.stats().snapshot();
        assert_eq!(stats.unroutable_dropped, 1);
        assert_eq!(stats.requests_dispatched, 1);
        assert_eq!(stats.requests_dropped, 0);
    }

    #[tokio::test]
    async fn request_is_dropped_when_every_idle_worker_has_departed() {
        let (mut broker, frontend, backend) = broker(None);
        backend.push(ready("ghost"));
        frontend.push(request("c1", "job"));
        broker.step().await.unwrap();

        assert!(backend.sent().is_empty());
        assert!(broker.availability().is_empty());
        assert_eq!(broker.stats().snapshot().requests_dropped, 1);

        frontend.push(request("c2", "job"));
        broker.step().await.unwrap();
        assert_eq!(frontend.receives(), 1);
    }

    #[tokio::test]
    async fn known_workers_are_not_tracked_without_a_limit() {
        let (mut broker, _frontend, backend) = broker(None);
        for worker in ["w1", "w2", "w3"] {
            backend.push(ready(worker));
            broker.step().await.unwrap();
        }
        assert_eq!(broker.availability().len(), 3);
        assert!(broker.known_workers().is_empty());
    }

    #[tokio::test]
    async fn reply_to_a_client_that_stopped_reading_is_dropped() {
        let (mut broker, frontend, backend) = broker(Some(2));
        backend.push(reply("w1", "slow", "OK"));
        assert_eq!(broker.step().await.unwrap(), Step::Continue);

        assert!(frontend.sent().is_empty());
        assert_eq!(broker.pending(), Some(1));
        assert_eq!(queued(&broker), vec![Identity::from("w1")]);
        assert_eq!(broker.stats().snapshot().backpressure_dropped, 1);
        assert!(!broker.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn stop_interrupts_a_send_that_never_completes() {
        let (mut broker, frontend, backend) = broker(None);
        backend.push(ready("w1"));
        frontend.push(request("c1", "job"));
        backend.stalled.store(true, Ordering::SeqCst);

        let token = broker.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let step = tokio::time::timeout(Duration::from_secs(1), broker.step())
            .await
            .expect("a stop must end a stalled send");
        assert_eq!(step.unwrap(), Step::Continue);
        assert_eq!(broker.step().await.unwrap(), Step::Stopped);
        assert_eq!(broker.stats().snapshot().requests_dispatched, 0);
    }
}

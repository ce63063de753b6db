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

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters maintained by a running [`BrokerLoop`](crate::common::BrokerLoop).
///
/// Only the loop writes them. Anyone holding the `Arc` (for example a
/// [`BrokerHandle`](crate::common::BrokerHandle)) may read them while it runs.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Ready announcements accepted from workers.
    pub ready_announcements: AtomicUsize,
    /// Client requests forwarded to a worker.
    pub requests_dispatched: AtomicUsize,
    /// Worker replies forwarded to a client.
    pub replies_routed: AtomicUsize,
    /// Inbound envelopes dropped as malformed.
    pub malformed_dropped: AtomicUsize,
    /// Ready announcements from workers that were already queued.
    pub duplicate_ready: AtomicUsize,
    /// Outbound envelopes whose destination was no longer connected.
    pub unroutable_dropped: AtomicUsize,
    /// Outbound envelopes whose destination had stopped reading.
    pub backpressure_dropped: AtomicUsize,
    /// Client requests dropped because no idle worker was reachable.
    pub requests_dropped: AtomicUsize,
    /// Receives issued on the client-facing channel.
    pub frontend_polls: AtomicUsize,
    /// Receives issued on the worker-facing channel.
    pub backend_polls: AtomicUsize,
}

/// Plain copy of [`BrokerStats`] at one moment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStatsSnapshot {
    /// See [`BrokerStats::ready_announcements`].
    pub ready_announcements: usize,
    /// See [`BrokerStats::requests_dispatched`].
    pub requests_dispatched: usize,
    /// See [`BrokerStats::replies_routed`].
    pub replies_routed: usize,
    /// See [`BrokerStats::malformed_dropped`].
    pub malformed_dropped: usize,
    /// See [`BrokerStats::duplicate_ready`].
    pub duplicate_ready: usize,
    /// See [`BrokerStats::unroutable_dropped`].
    pub unroutable_dropped: usize,
    /// See [`BrokerStats::backpressure_dropped`].
    pub backpressure_dropped: usize,
    /// See [`BrokerStats::requests_dropped`].
    pub requests_dropped: usize,
    /// See [`BrokerStats::frontend_polls`].
    pub frontend_polls: usize,
    /// See [`BrokerStats::backend_polls`].
    pub backend_polls: usize,
}

impl BrokerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            ready_announcements: self.ready_announcements.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            replies_routed: self.replies_routed.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            duplicate_ready: self.duplicate_ready.load(Ordering::Relaxed),
            unroutable_dropped: self.unroutable_dropped.load(Ordering::Relaxed),
            backpressure_dropped: self.backpressure_dropped.load(Ordering::Relaxed),
            requests_dropped: self.requests_dropped.load(Ordering::Relaxed),
            frontend_polls: self.frontend_polls.load(Ordering::Relaxed),
            backend_polls: self.backend_polls.load(Ordering::Relaxed),
        }
    }
}

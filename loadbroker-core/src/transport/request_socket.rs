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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::message::{Envelope, Identity};
use crate::traits::Channel;
use crate::transport::context::{RouterInbox, RouterShared};
use crate::transport::TransportError;

/// The connecting side of an in-process channel, used by client and worker sessions.
///
/// [`send`](Self::send) puts the empty delimiter in front of the payload, and
/// [`recv`](Self::recv) drops everything up to and including the first
/// delimiter. A session therefore only ever sees the part of the routing trail
/// that sits after its own address, which is what lets a worker hand the client
/// address back unchanged.
///
/// Sends and receives need not alternate. The raw [`Channel`] impl skips the
/// delimiter handling entirely.
///
/// Dropping the socket disconnects it; the router then treats its identity as
/// unroutable.
#[derive(Debug)]
pub struct RequestSocket {
    identity: Identity,
    outbox: RouterInbox,
    inbox: mpsc::Receiver<Envelope>,
    shared: Arc<RouterShared>,
}

impl RequestSocket {
    pub(crate) fn new(
        identity: Identity,
        shared: Arc<RouterShared>,
        inbox: mpsc::Receiver<Envelope>,
    ) -> Self {
        Self {
            identity,
            outbox: shared.inbound.clone(),
            inbox,
            shared,
        }
    }

    /// The identity the router knows this socket by.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Sends `parts` behind an empty delimiter.
    ///
    /// Waits while the router inbox is full.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] once the router has gone away.
    pub async fn send<I, B>(&self, parts: I) -> Result<(), TransportError>
    where
        I: IntoIterator<Item = B> + Send,
        B: Into<Bytes>,
    {
        let mut envelope = Envelope::from_payload(parts);
        envelope.push_front(Bytes::new());
        self.try_send(envelope).await
    }

    /// Waits up to `timeout` for the next message and returns the segments
    /// after its first delimiter.
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] once the router has gone away, and
    /// [`TransportError::Malformed`] if the message carries no delimiter.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>, TransportError> {
        let Some(envelope) = self.try_receive(timeout).await? else {
            return Ok(None);
        };
        let mut segments = envelope.into_segments();
        let Some(delimiter) = segments.iter().position(Bytes::is_empty) else {
            return Err(TransportError::Malformed(
                "inbound message has no delimiter".into(),
            ));
        };
        Ok(Some(segments.split_off(delimiter + 1)))
    }

    /// Drops every message already waiting in the inbox without blocking.
    ///
    /// Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.inbox.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            trace!(peer = %self.identity, discarded, "socket inbox cleared");
        }
        discarded
    }
}

#[async_trait]
impl Channel for RequestSocket {
    async fn try_send(&self, envelope: Envelope) -> Result<(), TransportError> {
        trace!(peer = %self.identity, segments = envelope.len(), "socket send");
        self.outbox
            .send((self.identity.clone(), envelope))
            .await
            .map_err(TransportError::from)
    }

    async fn try_receive(&mut self, timeout: Duration) -> Result<Option<Envelope>, TransportError> {
        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Err(TransportError::Closed),
            Ok(Some(envelope)) => Ok(Some(envelope)),
        }
    }
}

impl Drop for RequestSocket {
    fn drop(&mut self) {
        self.shared.detach(&self.identity);
    }
}

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
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::message::{Envelope, Identity};
use crate::traits::Channel;
use crate::transport::context::RouterShared;
use crate::transport::{Context, TransportError};

/// The bound, identity-aware side of an in-process channel.
///
/// Every inbound envelope arrives with the sending peer's [`Identity`] pushed
/// onto the front. Every outbound envelope must start with the identity of the
/// peer it is for; the router pops that segment and delivers the rest.
///
/// Dropping the router unbinds its address and disconnects all peers.
#[derive(Debug)]
pub struct RouterChannel {
    shared: Arc<RouterShared>,
    inbox: mpsc::Receiver<(Identity, Envelope)>,
    context: Context,
}

impl RouterChannel {
    pub(crate) fn new(
        shared: Arc<RouterShared>,
        inbox: mpsc::Receiver<(Identity, Envelope)>,
        context: Context,
    ) -> Self {
        Self {
            shared,
            inbox,
            context,
        }
    }

    /// Number of peers currently connected.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.shared.peers.len()
    }

}

#[async_trait]
impl Channel for RouterChannel {
    async fn try_send(&self, mut envelope: Envelope) -> Result<(), TransportError> {
        let destination = match envelope.pop_front() {
            Some(segment) if !segment.is_empty() => Identity::from(segment),
            _ => {
                return Err(TransportError::Malformed(
                    "outbound envelope has no destination identity".into(),
                ))
            }
        };

        let Some(outbox) = self.shared.peers.get(&destination) else {
            return Err(TransportError::Unroutable(destination));
        };

        trace!(peer = %destination, segments = envelope.len(), address = %self.shared.address, "router send");
        // Never waits on a peer inbox.
        match outbox.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::PeerFull(destination.clone())),
            Err(TrySendError::Closed(_)) => Err(TransportError::Unroutable(destination.clone())),
        }
    }

    async fn try_receive(&mut self, timeout: Duration) -> Result<Option<Envelope>, TransportError> {
        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Err(TransportError::Closed),
            Ok(Some((identity, mut envelope))) => {
                trace!(peer = %identity, segments = envelope.len(), address = %self.shared.address, "router receive");
                envelope.push_front(identity.into_bytes());
                Ok(Some(envelope))
            }
        }
    }
}

impl Drop for RouterChannel {
    fn drop(&mut self) {
        self.context.unbind(&self.shared.address);
        // Dropping the peer outboxes closes every peer inbox.
        self.shared.peers.clear();
    }
}

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

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use derive_new::new;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::message::{Envelope, Identity, ASSIGNED_IDENTITY_PREFIX};
use crate::transport::{RequestSocket, RouterChannel, TransportError};

/// Inbound half shared by every peer of one router: `(sender identity, frames)`.
pub(crate) type RouterInbox = mpsc::Sender<(Identity, Envelope)>;

/// Outbound half pointing at a single peer's inbox.
pub(crate) type PeerOutbox = mpsc::Sender<Envelope>;

/// State of one bound router, shared between the router and its peers.
#[derive(new, Debug)]
pub(crate) struct RouterShared {
    /// The address the router is bound at.
    pub(crate) address: String,
    /// Capacity of the router inbox and of every peer inbox.
    pub(crate) capacity: usize,
    /// Sender half of the router inbox, cloned into each peer.
    pub(crate) inbound: RouterInbox,
    /// Live peers keyed by identity.
    #[new(default)]
    pub(crate) peers: DashMap<Identity, PeerOutbox>,
    #[new(value = "AtomicU32::new(1)")]
    next_sequence: AtomicU32,
}

impl RouterShared {
    /// Registers a new peer and returns its identity and inbox.
    ///
    /// With `requested == None` the router assigns a fresh identity.
    pub(crate) fn attach(
        &self,
        requested: Option<Identity>,
    ) -> Result<(Identity, mpsc::Receiver<Envelope>), TransportError> {
        let identity = match requested {
            Some(identity) => {
                validate_explicit(&identity)?;
                identity
            }
            None => Identity::assigned(self.next_sequence.fetch_add(1, Ordering::Relaxed)),
        };

        let (outbox, inbox) = mpsc::channel(self.capacity);
        match self.peers.entry(identity.clone()) {
            Entry::Occupied(_) => Err(TransportError::InvalidIdentity(format!(
                "{identity} is already connected to {}",
                self.address
            ))),
            Entry::Vacant(slot) => {
                slot.insert(outbox);
                trace!(peer = %identity, address = %self.address, "peer attached");
                Ok((identity, inbox))
            }
        }
    }

    /// Forgets a peer; later sends addressed to it are unroutable.
    pub(crate) fn detach(&self, identity: &Identity) {
        if self.peers.remove(identity).is_some() {
            trace!(peer = %identity, address = %self.address, "peer detached");
        }
    }
}

fn validate_explicit(identity: &Identity) -> Result<(), TransportError> {
    let bytes = identity.as_bytes();
    if bytes.is_empty() {
        return Err(TransportError::InvalidIdentity("identity is empty".into()));
    }
    if bytes[0] == ASSIGNED_IDENTITY_PREFIX {
        return Err(TransportError::InvalidIdentity(format!(
            "{identity} uses the reserved leading zero byte"
        )));
    }
    Ok(())
}

/// Registry of in-process endpoints.
///
/// A `Context` plays the part of a socket context: routers
/// [`bind`](Self::bind) to an address such as `inproc://backend` and sessions
/// [`connect`](Self::connect) to it. Cloning is cheap and every clone sees the
/// same endpoints.
#[derive(Debug, Clone, Default)]
pub struct Context {
    endpoints: Arc<DashMap<String, Arc<RouterShared>>>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a router at `address`.
    ///
    /// `capacity` bounds the router inbox and each peer inbox. When the router
    /// inbox is full, peers wait in `send`, which is how unserved client
    /// requests queue up outside the broker. The router itself never waits:
    /// sending to a peer whose inbox is full fails with
    /// [`TransportError::PeerFull`].
    ///
    /// # Errors
    ///
    /// [`TransportError::AddressInUse`] if a router is already bound there.
    #[instrument(skip(self))]
    pub fn bind(&self, address: &str, capacity: usize) -> Result<RouterChannel, TransportError> {
        let (inbound, receiver) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(RouterShared::new(address.to_string(), capacity.max(1), inbound));
        match self.endpoints.entry(address.to_string()) {
            Entry::Occupied(_) => Err(TransportError::AddressInUse(address.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(shared.clone());
                debug!(address, capacity, "router bound");
                Ok(RouterChannel::new(shared, receiver, self.clone()))
            }
        }
    }

    /// Connects a new session to the router at `address` with an assigned identity.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionRefused`] if nothing is bound there.
    pub fn connect(&self, address: &str) -> Result<RequestSocket, TransportError> {
        self.attach(address, None)
    }

    /// Connects a new session under an explicit identity.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionRefused`] if nothing is bound there, and
    /// [`TransportError::InvalidIdentity`] if the identity is empty, starts with
    /// the reserved zero byte, or is held by a live peer.
    pub fn connect_as(
        &self,
        address: &str,
        identity: impl Into<Identity>,
    ) -> Result<RequestSocket, TransportError> {
        self.attach(address, Some(identity.into()))
    }

    /// True when a router is bound at `address`.
    #[must_use]
    pub fn is_bound(&self, address: &str) -> bool {
        self.endpoints.contains_key(address)
    }

    fn attach(
        &self,
        address: &str,
        requested: Option<Identity>,
    ) -> Result<RequestSocket, TransportError> {
        let shared = self
            .endpoints
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::ConnectionRefused(address.to_string()))?;
        let (identity, inbox) = shared.attach(requested)?;
        Ok(RequestSocket::new(identity, shared, inbox))
    }

    pub(crate) fn unbind(&self, address: &str) {
        if self.endpoints.remove(address).is_some() {
            debug!(address, "router unbound");
        }
    }
}

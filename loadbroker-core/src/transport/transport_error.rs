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

use thiserror::Error;

use crate::message::Identity;

/// Errors raised by a [`Channel`](crate::traits::Channel) or by the [`Context`](super::Context)
/// while binding and connecting endpoints.
///
/// A receive that times out is not an error; it is reported as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The other side of the channel is gone; nothing more can be sent or received.
    #[error("channel closed")]
    Closed,

    /// No live peer is registered under the destination identity.
    #[error("no peer with identity {0}")]
    Unroutable(Identity),

    /// The destination peer is connected but has stopped reading; its inbox is full.
    #[error("inbox of peer {0} is full")]
    PeerFull(Identity),

    /// An outbound envelope did not carry a destination identity.
    #[error("malformed outbound envelope: {0}")]
    Malformed(String),

    /// Another router is already bound at this address.
    #[error("address already in use: {0}")]
    AddressInUse(String),

    /// Nothing is bound at this address.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// An explicit identity was empty, reserved, or already taken.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}

impl TransportError {
    /// True when the channel that produced this error cannot be used again.
    ///
    /// Routing misses, full peer inboxes and malformed outbound envelopes
    /// concern a single message and leave the channel intact.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TransportError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Closed
    }
}

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

use bytes::Bytes;
use loadbroker_core::message::Identity;
use loadbroker_core::transport::RequestSocket;
use tracing::{instrument, trace, warn};

use crate::session::SessionError;

/// A simulated client connected to the broker's frontend.
///
/// Each [`request`](Self::request) is one strict round trip: send, then wait
/// for the reply. The broker only ever routes a reply back to the identity
/// that sent the request, so the reply received is always this client's.
/// A reply that arrives after its request timed out is discarded by the next
/// request rather than returned in place of that request's reply.
#[derive(Debug)]
pub struct ClientSession {
    socket: RequestSocket,
}

impl ClientSession {
    /// Wraps a socket connected to the frontend.
    pub const fn new(socket: RequestSocket) -> Self {
        Self { socket }
    }

    /// The identity the broker knows this client by.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.socket.identity()
    }

    /// Sends `payload` and waits up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// [`SessionError::ReplyTimeout`] when nothing arrives in time, otherwise
    /// whatever the socket reports.
    pub async fn request<I, B>(&mut self, payload: I, timeout: Duration) -> Result<Vec<Bytes>, SessionError>
    where
        I: IntoIterator<Item = B> + Send,
        B: Into<Bytes>,
    {
        let stale = self.socket.discard_pending();
        if stale > 0 {
            warn!(client = %self.socket.identity(), stale, "discarding replies to timed-out requests");
        }
        self.socket.send(payload).await?;
        match self.socket.recv(timeout).await? {
            Some(reply) => Ok(reply),
            None => Err(SessionError::ReplyTimeout(timeout)),
        }
    }

    /// Performs `cycles` round trips with the same payload and returns every reply.
    ///
    /// # Errors
    ///
    /// The first error from [`request`](Self::request).
    #[instrument(skip_all, fields(client = %self.socket.identity(), cycles = cycles))]
    pub async fn run(
        &mut self,
        payload: &[Bytes],
        cycles: usize,
        timeout: Duration,
    ) -> Result<Vec<Vec<Bytes>>, SessionError> {
        let mut replies = Vec::with_capacity(cycles);
        for cycle in 0..cycles {
            let reply = self.request(payload.to_vec(), timeout).await?;
            trace!(cycle, "reply received");
            replies.push(reply);
        }
        Ok(replies)
    }
}

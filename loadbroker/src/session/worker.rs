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
use loadbroker_core::transport::{RequestSocket, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::session::SessionError;

const DEFAULT_POLL: Duration = Duration::from_millis(100);

/// Handler that answers every request with the same payload.
pub fn reply_with(payload: impl Into<Bytes>) -> impl Fn(&[Bytes]) -> Vec<Bytes> + Clone + Send + Sync {
    let payload = payload.into();
    move |_request| vec![payload.clone()]
}

/// Handler that answers with the request unchanged.
pub fn echo(request: &[Bytes]) -> Vec<Bytes> {
    request.to_vec()
}

/// A simulated worker connected to the broker's backend.
///
/// Announces itself once, then serves requests until cancelled. Every reply
/// goes back to the broker with the client address it arrived with, so the
/// next request is the broker's signal that the worker is idle again.
#[derive(Debug)]
pub struct WorkerSession {
    socket: RequestSocket,
    ready_marker: Bytes,
    poll_timeout: Duration,
}

impl WorkerSession {
    /// Wraps a socket connected to the backend.
    pub fn new(socket: RequestSocket, ready_marker: impl Into<Bytes>) -> Self {
        Self {
            socket,
            ready_marker: ready_marker.into(),
            poll_timeout: DEFAULT_POLL,
        }
    }

    /// Sets how long each receive waits before checking for cancellation again.
    #[must_use]
    pub const fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// The identity the broker knows this worker by.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.socket.identity()
    }

    /// Serves requests with `handler` until `cancel` fires and returns how
    /// many were served.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] if the socket fails before cancellation.
    #[instrument(skip_all, fields(worker = %self.socket.identity()))]
    pub async fn run<H>(mut self, handler: H, cancel: CancellationToken) -> Result<usize, SessionError>
    where
        H: Fn(&[Bytes]) -> Vec<Bytes> + Send,
    {
        self.socket.send([self.ready_marker.clone()]).await?;
        debug!("worker ready");

        let mut served = 0;
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = self.socket.recv(self.poll_timeout) => received,
            };
            let segments = match received {
                Ok(Some(segments)) => segments,
                Ok(None) => continue,
                Err(TransportError::Malformed(reason)) => {
                    warn!(%reason, "ignoring malformed request");
                    continue;
                }
                Err(TransportError::Closed) if cancel.is_cancelled() => break,
                Err(e) => return Err(e.into()),
            };

            if segments.len() < 2 || segments[0].is_empty() || !segments[1].is_empty() {
                warn!(segments = segments.len(), "request has no client address");
                continue;
            }
            let (address, request) = segments.split_at(2);
            let mut reply = address.to_vec();
            reply.extend(handler(request));

            trace!(segments = request.len(), "replying");
            self.socket.send(reply).await?;
            served += 1;
        }

        debug!(served, "worker stopped");
        Ok(served)
    }
}

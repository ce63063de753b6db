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

use async_trait::async_trait;

use crate::message::Envelope;
use crate::transport::TransportError;

/// One end of a message channel as the broker sees it.
///
/// Implementations deliver whole envelopes. They never split or merge them,
/// and they never look at payload segments.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Sends an addressed envelope.
    ///
    /// A failure is a transport condition, not a routing decision; see
    /// [`TransportError::is_fatal`].
    async fn try_send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the next inbound envelope.
    ///
    /// Returns `Ok(None)` when the wait elapses with nothing to read.
    async fn try_receive(&mut self, timeout: Duration) -> Result<Option<Envelope>, TransportError>;
}

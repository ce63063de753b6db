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

#![forbid(unsafe_code)]
#![forbid(missing_docs)]

//! # Loadbroker Core
//!
//! Routing primitives for a load-balancing request/reply broker.
//!
//! ## Key Concepts
//!
//! - **Identity (`Identity`)**: opaque token naming one peer of a router.
//! - **Envelope (`Envelope`)**: stack of return addresses, each followed by an
//!   empty delimiter, in front of opaque payload segments.
//! - **Availability (`AvailabilityQueue`)**: FIFO of idle worker identities with
//!   no duplicates.
//! - **Transport (`Channel`, `Context`)**: send/receive-with-timeout over
//!   in-process router channels.

/// Routing state shared by broker instances.
pub mod common;

/// Identities and envelopes.
pub mod message;

/// Traits implemented by transports.
pub mod traits;

/// In-process router transport.
pub mod transport;

/// Re-exports of the most commonly used items.
pub mod prelude {
    pub use crate::common::{AvailabilityQueue, Enqueued};
    pub use crate::message::{Envelope, EnvelopeError, Identity};
    pub use crate::traits::Channel;
    pub use crate::transport::{Context, RequestSocket, RouterChannel, TransportError};
}

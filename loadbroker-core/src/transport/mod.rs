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

//! In-process router transport.
//!
//! A [`Context`] holds bound endpoints. The broker binds a [`RouterChannel`] on
//! each side, and sessions connect [`RequestSocket`]s to them. Both sides
//! implement [`Channel`](crate::traits::Channel) on top of bounded Tokio MPSC
//! channels.

pub use context::Context;
pub use request_socket::RequestSocket;
pub use router::RouterChannel;
pub use transport_error::TransportError;

/// Defines the endpoint registry and per-router shared state.
mod context;
/// Defines the session-side [`RequestSocket`].
mod request_socket;
/// Defines the broker-side [`RouterChannel`].
mod router;
/// Defines [`TransportError`].
mod transport_error;

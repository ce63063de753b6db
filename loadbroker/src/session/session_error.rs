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

use loadbroker_core::transport::TransportError;
use thiserror::Error;

/// Errors raised by client and worker sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The socket failed.
    #[error(transparent)]
    Transport(TransportError),
    /// No reply arrived within the bound.
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),
    /// A message did not have the expected shape.
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Malformed(reason) => Self::Malformed(reason),
            other => Self::Transport(other),
        }
    }
}

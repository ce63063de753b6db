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

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Leading byte of every identity the router assigns on connect.
///
/// Explicit identities may not start with this byte, so an assigned identity
/// can never collide with one chosen by a session or with a printable marker.
pub const ASSIGNED_IDENTITY_PREFIX: u8 = 0x00;

/// An opaque, process-unique token naming one peer of a router channel.
///
/// The same value is used as the routing address on the wire and as the entry
/// stored in the [`AvailabilityQueue`](crate::common::AvailabilityQueue). It is
/// never mutated after the router hands it out.
///
/// Cloning is cheap: the bytes are reference counted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Bytes);

impl Identity {
    /// Wraps raw bytes as an identity without validation.
    #[inline]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Builds the identity the router assigns to its `sequence`-th connection.
    #[must_use]
    pub fn assigned(sequence: u32) -> Self {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(ASSIGNED_IDENTITY_PREFIX);
        buf.put_u32(sequence);
        Self(buf.freeze())
    }

    /// True when this identity came from [`Identity::assigned`].
    #[inline]
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.0.len() == 5 && self.0[0] == ASSIGNED_IDENTITY_PREFIX
    }

    /// The identity as a wire segment.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consumes the identity, returning the wire segment.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Identity {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<&'static str> for Identity {
    fn from(value: &'static str) -> Self {
        Self(Bytes::from_static(value.as_bytes()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = !self.0.is_empty()
            && self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ');
        if printable {
            // Every byte is ASCII here.
            f.write_str(&String::from_utf8_lossy(&self.0))
        } else {
            for b in &self.0 {
                write!(f, "{b:02x}")?;
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

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

use std::collections::vec_deque;
use std::collections::VecDeque;

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::message::Identity;

/// Reasons an envelope cannot be split into an address and a remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The envelope has no segments at all.
    #[error("envelope has no segments")]
    Empty,
    /// The leading segment is zero-length, so it cannot be an address.
    #[error("envelope address segment is empty")]
    EmptyAddress,
    /// The address is not followed by the empty delimiter segment.
    #[error("envelope address is not followed by a delimiter")]
    MissingDelimiter,
}

/// An ordered multi-segment message carrying its own routing trail.
///
/// Segments are opaque bytes. The layout is a stack of return addresses, each
/// followed by a zero-length delimiter, and then the payload segments:
///
/// ```text
/// [address_n, "", ..., address_1, "", payload_1, payload_2, ...]
/// ```
///
/// The most recently added address is always at the front. [`Envelope::wrap_address`]
/// pushes one onto the front and [`Envelope::strip_address`] pops it again, so for any
/// well-formed `e`:
///
/// ```rust,ignore
/// let (address, rest) = e.clone().strip_address()?;
/// assert_eq!(Envelope::wrap_address(address, rest), e);
/// ```
///
/// The broker never looks inside payload segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    segments: VecDeque<Bytes>,
}

impl Envelope {
    /// Creates an envelope with no segments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an envelope holding only payload segments, with no routing trail.
    pub fn from_payload<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            segments: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Prepends `address` and a delimiter to `rest`.
    #[must_use]
    pub fn wrap_address(address: Identity, mut rest: Envelope) -> Self {
        trace!(%address, "wrapping envelope");
        rest.segments.push_front(Bytes::new());
        rest.segments.push_front(address.into_bytes());
        rest
    }

    /// Splits off the leading address and its delimiter.
    ///
    /// The remainder is everything after the delimiter, which may itself carry
    /// further addresses.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] when the envelope is empty, the address is
    /// zero-length, or the address is not followed by a delimiter.
    pub fn strip_address(mut self) -> Result<(Identity, Envelope), EnvelopeError> {
        match self.segments.front() {
            None => return Err(EnvelopeError::Empty),
            Some(address) if address.is_empty() => return Err(EnvelopeError::EmptyAddress),
            Some(_) => {}
        }
        match self.segments.get(1) {
            Some(delimiter) if delimiter.is_empty() => {}
            _ => return Err(EnvelopeError::MissingDelimiter),
        }
        let (Some(address), Some(_delimiter)) =
            (self.segments.pop_front(), self.segments.pop_front())
        else {
            return Err(EnvelopeError::Empty);
        };
        Ok((Identity::from(address), self))
    }

    /// Pushes a single segment onto the front.
    pub fn push_front(&mut self, segment: impl Into<Bytes>) {
        self.segments.push_front(segment.into());
    }

    /// Removes and returns the front segment.
    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.segments.pop_front()
    }

    /// Returns the front segment without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&Bytes> {
        self.segments.front()
    }

    /// Number of segments, delimiters included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the envelope has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterates over the segments front to back.
    pub fn iter(&self) -> vec_deque::Iter<'_, Bytes> {
        self.segments.iter()
    }

    /// All segments, front first.
    #[must_use]
    pub const fn segments(&self) -> &VecDeque<Bytes> {
        &self.segments
    }

    /// The segments after the last delimiter, which is the payload without
    /// any routing trail. An envelope with no delimiter is all payload.
    pub fn payload(&self) -> vec_deque::Iter<'_, Bytes> {
        let start = self
            .segments
            .iter()
            .rposition(Bytes::is_empty)
            .map_or(0, |delimiter| delimiter + 1);
        self.segments.range(start..)
    }

    /// Borrows the segment at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.segments.get(index)
    }

    /// Consumes the envelope, returning its segments in order.
    #[must_use]
    pub fn into_segments(self) -> Vec<Bytes> {
        self.segments.into()
    }
}

impl<'a> IntoIterator for &'a Envelope {
    type Item = &'a Bytes;
    type IntoIter = vec_deque::Iter<'a, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl FromIterator<Bytes> for Envelope {
    fn from_iter<T: IntoIterator<Item = Bytes>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_request() -> Envelope {
        Envelope::from_payload([
            Bytes::from_static(b"client-1"),
            Bytes::new(),
            Bytes::from_static(b"HELLO"),
        ])
    }

    #[test]
    fn strip_then_wrap_restores_envelope() {
        let original = client_request();
        let (address, rest) = original.clone().strip_address().unwrap();
        assert_eq!(address, Identity::from("client-1"));
        assert_eq!(rest, Envelope::from_payload(["HELLO"]));
        assert_eq!(Envelope::wrap_address(address, rest), original);
    }

    #[test]
    fn round_trip_holds_for_nested_trails() {
        let inner = Envelope::wrap_address(Identity::from("client-7"), Envelope::from_payload(["a", "b"]));
        let outer = Envelope::wrap_address(Identity::assigned(3), inner.clone());
        assert_eq!(outer.len(), 6);

        let (worker, rest) = outer.clone().strip_address().unwrap();
        assert_eq!(worker, Identity::assigned(3));
        assert_eq!(rest, inner);
        assert_eq!(Envelope::wrap_address(worker, rest), outer);
    }

    #[test]
    fn round_trip_holds_with_empty_remainder() {
        let e = Envelope::from_payload([Bytes::from_static(b"w"), Bytes::new()]);
        let (address, rest) = e.clone().strip_address().unwrap();
        assert!(rest.is_empty());
        assert_eq!(Envelope::wrap_address(address, rest), e);
    }

    #[test]
    fn strip_rejects_malformed_envelopes() {
        assert_eq!(Envelope::new().strip_address(), Err(EnvelopeError::Empty));
        assert_eq!(
            Envelope::from_payload(["client-1", "HELLO"]).strip_address(),
            Err(EnvelopeError::MissingDelimiter)
        );
        assert_eq!(
            Envelope::from_payload(["client-1"]).strip_address(),
            Err(EnvelopeError::MissingDelimiter)
        );
        assert_eq!(
            Envelope::from_payload([Bytes::new(), Bytes::from_static(b"HELLO")]).strip_address(),
            Err(EnvelopeError::EmptyAddress)
        );
    }

    #[test]
    fn payload_skips_the_whole_trail() {
        let e = Envelope::wrap_address(
            Identity::from("worker"),
            Envelope::wrap_address(Identity::from("client"), Envelope::from_payload(["a", "b"])),
        );
        assert_eq!(e.segments().len(), 6);
        assert_eq!(
            e.payload().cloned().collect::<Vec<_>>(),
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
        assert_eq!(Envelope::from_payload(["x"]).payload().count(), 1);
    }

    #[test]
    fn push_and_pop_work_on_the_front() {
        let mut e = Envelope::from_payload(["payload"]);
        e.push_front(Bytes::new());
        e.push_front("addr");
        assert_eq!(e.front(), Some(&Bytes::from_static(b"addr")));
        assert_eq!(e.pop_front(), Some(Bytes::from_static(b"addr")));
        assert_eq!(e.pop_front(), Some(Bytes::new()));
        assert_eq!(e.into_segments(), vec![Bytes::from_static(b"payload")]);
    }
}

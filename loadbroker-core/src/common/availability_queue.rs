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

use std::collections::{vec_deque, HashSet, VecDeque};

use tracing::trace;

use crate::message::Identity;

/// Outcome of [`AvailabilityQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The identity was appended at the tail.
    Added,
    /// The identity was already queued; the queue is unchanged.
    Duplicate,
}

/// FIFO collection of idle worker identities.
///
/// An identity is present exactly while its worker is idle. Workers are handed
/// out in the order they became idle, so the one that has waited longest is
/// always dispatched first.
///
/// The queue never holds the same identity twice. A repeated
/// [`enqueue`](Self::enqueue) is a no-op reported as [`Enqueued::Duplicate`];
/// under a well-behaved worker this only happens after a spurious second ready
/// announcement.
#[derive(Debug, Default, Clone)]
pub struct AvailabilityQueue {
    order: VecDeque<Identity>,
    members: HashSet<Identity>,
}

impl AvailabilityQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `identity` at the tail unless it is already queued.
    pub fn enqueue(&mut self, identity: Identity) -> Enqueued {
        if !self.members.insert(identity.clone()) {
            trace!(worker = %identity, "worker already queued");
            return Enqueued::Duplicate;
        }
        trace!(worker = %identity, depth = self.order.len() + 1, "worker queued");
        self.order.push_back(identity);
        Enqueued::Added
    }

    /// Removes and returns the identity that has been idle longest.
    ///
    /// Returns `None` on an empty queue; callers gate on [`len`](Self::len) first.
    pub fn dequeue_head(&mut self) -> Option<Identity> {
        let head = self.order.pop_front()?;
        self.members.remove(&head);
        Some(head)
    }

    /// True when `identity` is currently queued.
    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    /// Number of idle workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no worker is idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates head to tail.
    pub fn iter(&self) -> vec_deque::Iter<'_, Identity> {
        self.order.iter()
    }
}

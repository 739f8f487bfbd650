// Event buffer
//
// Append-only list of newly received events. Draining is the only removal,
// except that a full buffer drops its oldest event to make room.

use std::collections::VecDeque;

use ubik_core::ActivityEvent;

/// Bounded, insertion-ordered buffer of undrained events
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            dropped: 0,
        }
    }

    /// Append an event. Returns true when the oldest event was dropped.
    pub fn append(&mut self, event: ActivityEvent) -> bool {
        let overflow = self.events.len() >= self.capacity;
        if overflow {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
        overflow
    }

    /// Take all buffered events in delivery order, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<ActivityEvent> {
        self.events.drain(..).collect()
    }

    /// Copy of the buffered events in delivery order
    pub fn snapshot(&self) -> Vec<ActivityEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped so far because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

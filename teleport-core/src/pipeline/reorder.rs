//! Reorder buffer for concurrently encoded video frames.
//!
//! Entries are appended in submission order and completed in any order.
//! [`ReorderBuffer::drain_ready`] releases only the contiguous prefix of
//! completed entries, so frame N+1 can never overtake frame N.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::warn;

use crate::packet::WireMessage;

/// Handle to one reserved slot, returned by [`ReorderBuffer::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug)]
enum EncodeState {
    Pending,
    Done(Bytes),
    Failed,
}

/// One in-flight encode job.
#[derive(Debug)]
struct PendingEncode {
    ticket: Ticket,
    timestamp: i64,
    state: EncodeState,
}

#[derive(Debug)]
pub struct ReorderBuffer {
    entries: VecDeque<PendingEncode>,
    next_ticket: u64,
    capacity: usize,
    dropped: u64,
}

impl ReorderBuffer {
    /// A buffer that holds at most `capacity` in-flight frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            next_ticket: 0,
            capacity,
            dropped: 0,
        }
    }

    /// Append a pending entry, or count a dropped frame when full.
    pub fn reserve(&mut self, timestamp: i64) -> Option<Ticket> {
        if self.entries.len() >= self.capacity {
            self.dropped += 1;
            return None;
        }

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.entries.push_back(PendingEncode {
            ticket,
            timestamp,
            state: EncodeState::Pending,
        });
        Some(ticket)
    }

    /// Store the encoded bytes for `ticket`. Returns `false` for unknown tickets.
    pub fn complete(&mut self, ticket: Ticket, output: Bytes) -> bool {
        self.set_state(ticket, EncodeState::Done(output))
    }

    /// Mark `ticket` as finished without output; it is skipped on drain.
    pub fn fail(&mut self, ticket: Ticket) -> bool {
        self.set_state(ticket, EncodeState::Failed)
    }

    /// Remove and return the contiguous prefix of finished entries.
    pub fn drain_ready(&mut self) -> Vec<WireMessage> {
        let mut ready = Vec::new();

        while let Some(head) = self.entries.front() {
            if matches!(head.state, EncodeState::Pending) {
                break;
            }
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            if let EncodeState::Done(output) = entry.state {
                match WireMessage::jpeg(entry.timestamp, output) {
                    Ok(msg) => ready.push(msg),
                    Err(e) => warn!(timestamp = entry.timestamp, "discarding frame: {e}"),
                }
            }
        }

        ready
    }

    /// Frames currently in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames refused because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn set_state(&mut self, ticket: Ticket, state: EncodeState) -> bool {
        // Tickets are handed out consecutively, so the slot is an offset from the head.
        let Some(head) = self.entries.front() else {
            return false;
        };
        let Some(index) = ticket.0.checked_sub(head.ticket.0) else {
            return false;
        };
        match self.entries.get_mut(index as usize) {
            Some(entry) if entry.ticket == ticket => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }
}

//! Reference discrete-event dispatcher for the emulator.
//!
//! Events are delivered in time order. Ties break on priority (lower first)
//! and then on registration order, so runs are deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use signal_core::SimTime;
use signal_core::controller::{DispatchError, Dispatcher, PokeEvent};
use tracing::trace;

#[derive(Clone, Copy, Debug)]
struct Pending {
    event: PokeEvent,
    sequence: u64,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.event.priority.cmp(&self.event.priority))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Min-heap event queue that owns simulated time.
#[derive(Debug, Default)]
pub struct EventQueue {
    now: SimTime,
    pending: BinaryHeap<Pending>,
    next_sequence: u64,
    delivered: usize,
}

impl EventQueue {
    pub fn new(start: SimTime) -> Self {
        Self {
            now: start,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Time of the next pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.pending.peek().map(|pending| pending.event.time)
    }

    /// Events handed out since the queue was created.
    pub const fn delivered(&self) -> usize {
        self.delivered
    }

    /// Pops the next event due at or before `end` and moves the clock to it.
    pub fn pop_due(&mut self, end: SimTime) -> Option<PokeEvent> {
        if self.peek_time()? > end {
            return None;
        }

        let pending = self.pending.pop()?;
        self.now = pending.event.time;
        self.delivered += 1;
        trace!(
            target = pending.event.target,
            time = pending.event.time,
            "event delivered"
        );
        Some(pending.event)
    }

    /// Moves the clock forward to `time`; never moves it backwards.
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Delivers every event due up to `end`, then parks the clock at `end`.
    ///
    /// The handler may register further events; those due before `end` are
    /// delivered in the same call. Returns the number of events handled.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first handler error. The clock stays at the
    /// failing event's time.
    pub fn run_until<F, E>(&mut self, end: SimTime, mut handler: F) -> Result<usize, E>
    where
        F: FnMut(&mut Self, PokeEvent) -> Result<(), E>,
    {
        let mut handled = 0;
        while let Some(event) = self.pop_due(end) {
            handler(self, event)?;
            handled += 1;
        }
        self.advance_to(end);
        Ok(handled)
    }
}

impl Dispatcher for EventQueue {
    fn current_time(&self) -> SimTime {
        self.now
    }

    fn register_event(&mut self, event: PokeEvent) -> Result<(), DispatchError> {
        if !event.time.is_finite() {
            return Err(DispatchError::NonFiniteTime(event.time));
        }
        if event.time < self.now {
            return Err(DispatchError::PastTime {
                requested: event.time,
                now: self.now,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push(Pending { event, sequence });
        Ok(())
    }
}

//! Schedule transition records and the bounded recorder used by host tooling.
//!
//! A controller reports every change of its active schedule item through a
//! [`TransitionListener`]. [`TransitionRecorder`] keeps the most recent
//! transitions in a fixed-size ring, numbering each one and noting how long
//! the previous item stayed in effect.

use core::fmt;

use heapless::HistoryBuf;

use crate::{ControllerId, SimTime};

/// Total number of transitions retained in memory.
pub const TRANSITION_RING_CAPACITY: usize = 128;

/// Sequence number assigned to recorded transitions.
pub type TransitionId = u32;

/// A controller switched to a different schedule item, or went dark.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScheduleTransition {
    pub timestamp: SimTime,
    pub controller_id: ControllerId,
    /// `None` when the controller went dark.
    pub new_index: Option<usize>,
}

impl ScheduleTransition {
    #[must_use]
    pub const fn new(
        timestamp: SimTime,
        controller_id: ControllerId,
        new_index: Option<usize>,
    ) -> Self {
        Self {
            timestamp,
            controller_id,
            new_index,
        }
    }
}

impl fmt::Display for ScheduleTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.new_index {
            Some(index) => write!(
                f,
                "t={:.3} controller {} -> item {index}",
                self.timestamp, self.controller_id
            ),
            None => write!(
                f,
                "t={:.3} controller {} -> dark",
                self.timestamp, self.controller_id
            ),
        }
    }
}

/// Output sink for schedule transitions.
pub trait TransitionListener {
    fn write(&mut self, timestamp: SimTime, transition: &ScheduleTransition);
}

impl TransitionListener for Vec<ScheduleTransition> {
    fn write(&mut self, _: SimTime, transition: &ScheduleTransition) {
        self.push(*transition);
    }
}

impl<L> TransitionListener for &mut L
where
    L: TransitionListener + ?Sized,
{
    fn write(&mut self, timestamp: SimTime, transition: &ScheduleTransition) {
        (**self).write(timestamp, transition);
    }
}

/// Transition stored in the recorder ring.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransitionRecord {
    pub id: TransitionId,
    pub transition: ScheduleTransition,
    /// Seconds since the previously recorded transition.
    pub elapsed_since_previous: Option<f64>,
}

/// Transition ring buffer type alias.
pub type TransitionRing<const CAPACITY: usize = TRANSITION_RING_CAPACITY> =
    HistoryBuf<TransitionRecord, CAPACITY>;

/// Records transitions into a fixed-size ring buffer.
#[derive(Debug)]
pub struct TransitionRecorder<const CAPACITY: usize = TRANSITION_RING_CAPACITY> {
    ring: TransitionRing<CAPACITY>,
    last_transition_at: Option<SimTime>,
    next_id: TransitionId,
}

impl<const CAPACITY: usize> TransitionRecorder<CAPACITY> {
    /// Creates a recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_id: 0,
        }
    }

    /// Returns the recorded transitions in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TransitionRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent transition, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TransitionRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total number of transitions seen, including ones evicted from the ring.
    #[must_use]
    pub const fn total_recorded(&self) -> TransitionId {
        self.next_id
    }

    /// Stores `transition` and returns its sequence number.
    pub fn record(&mut self, transition: ScheduleTransition) -> TransitionId {
        let elapsed = self
            .last_transition_at
            .map(|previous| (transition.timestamp - previous).max(0.0));
        self.last_transition_at = Some(transition.timestamp);

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.ring.write(TransitionRecord {
            id,
            transition,
            elapsed_since_previous: elapsed,
        });

        id
    }
}

impl<const CAPACITY: usize> Default for TransitionRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> TransitionListener for TransitionRecorder<CAPACITY> {
    fn write(&mut self, _: SimTime, transition: &ScheduleTransition) {
        self.record(*transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_elapsed_between_transitions() {
        let mut recorder = TransitionRecorder::<8>::new();

        let first = recorder.record(ScheduleTransition::new(0.0, 1, Some(0)));
        assert_eq!(first, 0);
        let record = recorder.latest().copied().unwrap();
        assert_eq!(record.elapsed_since_previous, None);

        let second = recorder.record(ScheduleTransition::new(100.0, 1, Some(1)));
        assert_eq!(second, 1);
        let record = recorder.latest().copied().unwrap();
        let elapsed = record.elapsed_since_previous.expect("missing elapsed");
        assert!((elapsed - 100.0).abs() < 1e-9);
        assert_eq!(record.transition.new_index, Some(1));
    }

    #[test]
    fn ring_keeps_most_recent_entries() {
        let mut recorder = TransitionRecorder::<2>::new();
        for step in 0..5_u32 {
            recorder.record(ScheduleTransition::new(
                f64::from(step) * 10.0,
                1,
                Some(usize::try_from(step).unwrap()),
            ));
        }

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.total_recorded(), 5);
        let ids: Vec<TransitionId> = recorder.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn listener_impl_records_through_trait() {
        let mut recorder = TransitionRecorder::<4>::default();
        assert!(recorder.is_empty());

        let transition = ScheduleTransition::new(12.0, 7, None);
        TransitionListener::write(&mut recorder, 12.0, &transition);

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.latest().unwrap().transition, transition);
    }

    #[test]
    fn display_names_dark_transitions() {
        let active = ScheduleTransition::new(2.0, 3, Some(1));
        let dark = ScheduleTransition::new(4.5, 3, None);

        assert_eq!(active.to_string(), "t=2.000 controller 3 -> item 1");
        assert_eq!(dark.to_string(), "t=4.500 controller 3 -> dark");
    }
}

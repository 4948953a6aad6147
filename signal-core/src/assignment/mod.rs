//! Ordered multimap from actuator id to its schedule items.

use std::collections::BTreeMap;

use crate::ActuatorId;
use crate::stages::ScheduleItem;

/// Append-only table of schedule items keyed by actuator.
///
/// Items keep their insertion order per actuator and duplicates are allowed.
/// Keys iterate in ascending id order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduleAssignment {
    items: BTreeMap<ActuatorId, Vec<ScheduleItem>>,
}

impl ScheduleAssignment {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Appends `item` to the actuator's list, creating the entry if needed.
    pub fn assign(&mut self, actuator: ActuatorId, item: ScheduleItem) {
        self.items.entry(actuator).or_default().push(item);
    }

    /// Returns `true` when at least one item is assigned to the actuator.
    #[must_use]
    pub fn has(&self, actuator: ActuatorId) -> bool {
        self.items.get(&actuator).is_some_and(|items| !items.is_empty())
    }

    /// All items for the actuator in insertion order.
    #[must_use]
    pub fn get_all(&self, actuator: ActuatorId) -> &[ScheduleItem] {
        self.items
            .get(&actuator)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The first item assigned to the actuator.
    #[must_use]
    pub fn first_item(&self, actuator: ActuatorId) -> Option<&ScheduleItem> {
        self.get_all(actuator).first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Actuators with at least one assigned item, ascending.
    pub fn actuator_ids(&self) -> impl Iterator<Item = ActuatorId> + '_ {
        self.items.keys().copied()
    }

    /// Total number of items across all actuators.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActuatorId, &[ScheduleItem])> + '_ {
        self.items
            .iter()
            .map(|(&actuator, items)| (actuator, items.as_slice()))
    }
}

//! Stage and schedule item data shared by the controller and host tooling.
//!
//! A [`Stage`] is one phase configuration held for a fixed duration. A
//! [`ScheduleItem`] strings stages into a repeating cycle that becomes
//! eligible at its start time. Items are plain data: they do not know which
//! actuator they drive and never touch the network.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::controller::{ConfigurationError, ErrorLog};
use crate::{ActuatorId, PhaseId, SimTime};

/// One phase configuration held for a fixed duration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    order: u32,
    duration: f64,
    phase_ids: BTreeSet<PhaseId>,
}

impl Stage {
    #[must_use]
    pub fn new(order: u32, duration: f64, phase_ids: impl IntoIterator<Item = PhaseId>) -> Self {
        Self {
            order,
            duration,
            phase_ids: phase_ids.into_iter().collect(),
        }
    }

    /// Sequencing key within the owning item.
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.order
    }

    /// Hold time in seconds.
    #[must_use]
    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// Phases lit while the stage is active.
    #[must_use]
    pub const fn phase_ids(&self) -> &BTreeSet<PhaseId> {
        &self.phase_ids
    }

    #[must_use]
    pub fn activates(&self, phase: PhaseId) -> bool {
        self.phase_ids.contains(&phase)
    }
}

/// A repeating sequence of stages that becomes eligible at `start_time`.
///
/// Stages are kept sorted by `order` (stable, so equal orders keep their
/// insertion order). A `cycle` of zero means the cycle length is the sum of
/// the stage durations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScheduleItemRecord")]
pub struct ScheduleItem {
    start_time: SimTime,
    cycle: f64,
    offset: f64,
    stages: Vec<Stage>,
}

/// Wire form of a [`ScheduleItem`]; routed through [`ScheduleItem::new`] so
/// deserialized stages are sorted the same way as constructed ones.
#[derive(Deserialize)]
struct ScheduleItemRecord {
    #[serde(default)]
    start_time: SimTime,
    #[serde(default)]
    cycle: f64,
    #[serde(default)]
    offset: f64,
    stages: Vec<Stage>,
}

impl From<ScheduleItemRecord> for ScheduleItem {
    fn from(record: ScheduleItemRecord) -> Self {
        ScheduleItem::new(record.start_time, record.cycle, record.offset, record.stages)
    }
}

impl ScheduleItem {
    #[must_use]
    pub fn new(start_time: SimTime, cycle: f64, offset: f64, mut stages: Vec<Stage>) -> Self {
        stages.sort_by_key(Stage::order);
        Self {
            start_time,
            cycle,
            offset,
            stages,
        }
    }

    /// Builds an item with one stage per duration.
    ///
    /// Stage `k` has order `k` and lights phase `k`. The item starts at zero,
    /// has no offset, and derives its cycle from the durations.
    #[must_use]
    pub fn from_durations(durations: &[f64]) -> Self {
        let stages = durations
            .iter()
            .enumerate()
            .map(|(index, &duration)| {
                let order = u32::try_from(index).unwrap_or(u32::MAX);
                let phase = PhaseId::try_from(index).unwrap_or(PhaseId::MAX);
                Stage::new(order, duration, [phase])
            })
            .collect();
        Self::new(0.0, 0.0, 0.0, stages)
    }

    #[must_use]
    pub const fn start_time(&self) -> SimTime {
        self.start_time
    }

    #[must_use]
    pub const fn cycle(&self) -> f64 {
        self.cycle
    }

    #[must_use]
    pub const fn offset(&self) -> f64 {
        self.offset
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.stages.iter().map(Stage::duration).sum()
    }

    /// Cycle length used for stage selection.
    #[must_use]
    pub fn effective_cycle(&self) -> f64 {
        if self.cycle > 0.0 {
            self.cycle
        } else {
            self.total_duration()
        }
    }

    /// Returns the stage active at `time`, with its position in the item.
    ///
    /// The position in the cycle is `(time - start_time - offset)` taken
    /// modulo the effective cycle. Time left over after the last stage (when
    /// the durations fall short of the cycle) keeps the last stage lit.
    #[must_use]
    pub fn stage_at(&self, time: SimTime) -> Option<(usize, &Stage)> {
        let cycle = self.effective_cycle();
        if self.stages.is_empty() || !cycle.is_finite() || cycle <= 0.0 {
            return None;
        }

        let position = (time - self.start_time - self.offset).rem_euclid(cycle);
        if !position.is_finite() {
            return None;
        }

        let mut boundary = 0.0;
        for (index, stage) in self.stages.iter().enumerate() {
            boundary += stage.duration.max(0.0);
            if position < boundary {
                return Some((index, stage));
            }
        }

        self.stages.last().map(|stage| (self.stages.len() - 1, stage))
    }

    /// Appends structural problems with this item to `log`.
    ///
    /// Returns `true` when no problem was found.
    pub fn validate<L>(&self, actuator: ActuatorId, position: usize, log: &mut L) -> bool
    where
        L: ErrorLog + ?Sized,
    {
        let mut clean = true;
        let mut report = |error: ConfigurationError| {
            clean = false;
            log.append(error);
        };

        if !self.start_time.is_finite() {
            report(ConfigurationError::InvalidItemTiming {
                actuator,
                position,
                field: "start_time",
                value: self.start_time,
            });
        }
        if !self.offset.is_finite() {
            report(ConfigurationError::InvalidItemTiming {
                actuator,
                position,
                field: "offset",
                value: self.offset,
            });
        }
        if !self.cycle.is_finite() || self.cycle < 0.0 {
            report(ConfigurationError::InvalidCycle {
                actuator,
                position,
                cycle: self.cycle,
            });
        }

        if self.stages.is_empty() {
            report(ConfigurationError::EmptyStages { actuator, position });
        }

        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !stage.duration.is_finite() || stage.duration < 0.0 {
                report(ConfigurationError::InvalidStageDuration {
                    actuator,
                    position,
                    order: stage.order,
                    duration: stage.duration,
                });
            }
            if !seen.insert(stage.order) {
                report(ConfigurationError::DuplicateStageOrder {
                    actuator,
                    position,
                    order: stage.order,
                });
            }
        }

        let total = self.total_duration();
        if self.cycle.is_finite() && self.cycle > 0.0 && total > self.cycle {
            report(ConfigurationError::CycleOverrun {
                actuator,
                position,
                total,
                cycle: self.cycle,
            });
        }

        clean
    }
}

/// Selects the item in effect at `time`.
///
/// Returns `None` when the list is empty or `time` precedes the first start.
/// Otherwise returns the last index whose start is at or before `time`,
/// stopping at the first item that starts later.
#[must_use]
pub fn item_index_for_time(items: &[ScheduleItem], time: SimTime) -> Option<usize> {
    let first = items.first()?;
    if time < first.start_time {
        return None;
    }

    let mut selected = 0;
    for (index, item) in items.iter().enumerate().skip(1) {
        if item.start_time > time {
            break;
        }
        selected = index;
    }
    Some(selected)
}

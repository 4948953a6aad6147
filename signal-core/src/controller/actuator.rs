use std::collections::BTreeMap;

use crate::stages::{ScheduleItem, Stage};
use crate::{ActuatorId, SimTime};

/// Instruction handed to an actuator when its active schedule item changes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ActuatorCommand<'a> {
    /// The actuator has no schedule to follow.
    NoCommand,
    /// Follow `item`, which sits at `index` in the actuator's list.
    ScheduleItem { index: usize, item: &'a ScheduleItem },
}

impl ActuatorCommand<'_> {
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, ActuatorCommand::NoCommand)
    }

    /// Index of the commanded item, if any.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self {
            ActuatorCommand::NoCommand => None,
            ActuatorCommand::ScheduleItem { index, .. } => Some(*index),
        }
    }
}

/// A signal head or similar device that lights phases.
pub trait SignalActuator {
    fn id(&self) -> ActuatorId;

    /// Turns every phase off.
    fn turn_off(&mut self, now: SimTime);

    /// Loads the schedule item the actuator should follow.
    fn apply_command(&mut self, command: &ActuatorCommand<'_>, now: SimTime);

    /// Lights the phases of `stage` and darkens the rest.
    fn apply_stage(&mut self, stage: &Stage, now: SimTime);
}

/// Lookup from actuator id to the live actuator owned by the network.
pub trait ActuatorRegistry {
    fn actuator_mut(&mut self, id: ActuatorId) -> Option<&mut dyn SignalActuator>;
}

impl<A> ActuatorRegistry for BTreeMap<ActuatorId, A>
where
    A: SignalActuator,
{
    fn actuator_mut(&mut self, id: ActuatorId) -> Option<&mut dyn SignalActuator> {
        self.get_mut(&id)
            .map(|actuator| actuator as &mut dyn SignalActuator)
    }
}

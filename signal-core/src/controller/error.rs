use thiserror::Error;

use crate::{ActuatorId, ControllerId, SimTime};

/// Structural problem found while validating a controller's schedules.
///
/// `position` is the index of the offending item within the actuator's list.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("actuator {actuator} item {position} has no stages")]
    EmptyStages {
        actuator: ActuatorId,
        position: usize,
    },
    #[error("actuator {actuator} item {position} stage {order} has invalid duration {duration}")]
    InvalidStageDuration {
        actuator: ActuatorId,
        position: usize,
        order: u32,
        duration: f64,
    },
    #[error("actuator {actuator} item {position} repeats stage order {order}")]
    DuplicateStageOrder {
        actuator: ActuatorId,
        position: usize,
        order: u32,
    },
    #[error("actuator {actuator} item {position} has invalid cycle {cycle}")]
    InvalidCycle {
        actuator: ActuatorId,
        position: usize,
        cycle: f64,
    },
    #[error("actuator {actuator} item {position} stages last {total}s, longer than cycle {cycle}s")]
    CycleOverrun {
        actuator: ActuatorId,
        position: usize,
        total: f64,
        cycle: f64,
    },
    #[error("actuator {actuator} item {position} has non-finite {field} {value}")]
    InvalidItemTiming {
        actuator: ActuatorId,
        position: usize,
        field: &'static str,
        value: f64,
    },
    #[error(
        "actuator {actuator} item {position} starts at {start_time}, not after the previous item at {previous}"
    )]
    NonMonotonicStart {
        actuator: ActuatorId,
        position: usize,
        start_time: SimTime,
        previous: SimTime,
    },
    #[error("controller {controller} has schedules for unmanaged actuator {actuator}")]
    UnmanagedActuator {
        controller: ControllerId,
        actuator: ActuatorId,
    },
    #[error("controller {controller} manages actuator {actuator} without a schedule; it will be dropped")]
    MissingSchedule {
        controller: ControllerId,
        actuator: ActuatorId,
    },
}

/// Sink for validation findings.
pub trait ErrorLog {
    fn append(&mut self, error: ConfigurationError);
}

impl ErrorLog for Vec<ConfigurationError> {
    fn append(&mut self, error: ConfigurationError) {
        self.push(error);
    }
}

/// Reasons a dispatcher refuses to schedule an event.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DispatchError {
    #[error("event time {requested} is before the current time {now}")]
    PastTime { requested: SimTime, now: SimTime },
    #[error("event time {0} is not finite")]
    NonFiniteTime(SimTime),
    #[error("dispatcher is closed")]
    Closed,
}

/// Errors surfaced by [`PretimedController`](super::PretimedController) operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ControllerError {
    #[error("dispatcher rejected poke: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("controller step {0} is not a positive finite number of seconds")]
    InvalidStep(f64),
    #[error("controller has not been initialized")]
    NotInitialized,
}

/// Returned when an advance mode name is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown advance mode `{0}` (expected strict-compat or full-cycling)")]
pub struct ParseAdvanceModeError(pub String);

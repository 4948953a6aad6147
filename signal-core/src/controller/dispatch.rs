use crate::{ControllerId, SimTime};

use super::DispatchError;

/// Priority attached to controller wake-ups.
pub const CONTROLLER_POKE_PRIORITY: u8 = 2;

/// Wake-up request delivered back to a controller by the dispatcher.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PokeEvent {
    pub target: ControllerId,
    pub time: SimTime,
    pub priority: u8,
}

impl PokeEvent {
    #[must_use]
    pub const fn new(target: ControllerId, time: SimTime) -> Self {
        Self {
            target,
            time,
            priority: CONTROLLER_POKE_PRIORITY,
        }
    }
}

/// Discrete-event engine that owns simulated time.
pub trait Dispatcher {
    /// Current simulated time.
    fn current_time(&self) -> SimTime;

    /// Schedules `event` for future delivery.
    ///
    /// # Errors
    ///
    /// Implementations reject events they cannot deliver, such as events in
    /// the past or with a non-finite time.
    fn register_event(&mut self, event: PokeEvent) -> Result<(), DispatchError>;
}

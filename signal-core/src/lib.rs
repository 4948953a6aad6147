// Pretimed signal control logic shared by the simulator and host tooling.
//
// The crate owns schedule data, the per-actuator assignment table, and the
// pretimed controller state machine. Dispatchers, actuators, and output
// writers stay behind traits so any discrete-event engine can drive it.

pub mod assignment;
pub mod controller;
pub mod repl;
pub mod stages;
pub mod telemetry;

/// Simulated time in seconds.
pub type SimTime = f64;

/// Identifier of a signal actuator in the network.
pub type ActuatorId = u64;

/// Identifier of a controller in the scenario.
pub type ControllerId = u64;

/// Identifier of a signal phase on an actuator.
pub type PhaseId = u64;

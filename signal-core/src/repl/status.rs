//! Shared status surface for the console.
//!
//! Hosts build a [`StatusSnapshot`] from their controller and actuator models
//! so the `status` command can report live state without knowing how the
//! network is stored. [`StatusFormatter`] keeps the textual rendering
//! consistent across front-ends.

use core::fmt;

use heapless::Vec as HeaplessVec;

use crate::controller::{AdvanceMode, IntersectionState, PretimedController};
use crate::telemetry::TransitionId;
use crate::{ActuatorId, ControllerId, PhaseId, SimTime};

/// Actuators reported per snapshot.
pub const MAX_STATUS_ACTUATORS: usize = 16;
/// Lit phases reported per actuator.
pub const MAX_LIT_PHASES: usize = 8;

/// Sampled state for a single actuator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActuatorStatus {
    pub id: ActuatorId,
    pub managed: bool,
    /// Stage index last applied by the controller.
    pub stage: Option<usize>,
    pub lit: HeaplessVec<PhaseId, MAX_LIT_PHASES>,
}

impl ActuatorStatus {
    #[must_use]
    pub fn new(id: ActuatorId, managed: bool, stage: Option<usize>) -> Self {
        Self {
            id,
            managed,
            stage,
            lit: HeaplessVec::new(),
        }
    }

    /// Adds lit phases, ignoring any beyond [`MAX_LIT_PHASES`].
    #[must_use]
    pub fn with_lit(mut self, phases: impl IntoIterator<Item = PhaseId>) -> Self {
        for phase in phases {
            if self.lit.push(phase).is_err() {
                break;
            }
        }
        self
    }
}

/// Snapshot of the controller and its actuators at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub now: SimTime,
    pub controller_id: ControllerId,
    pub mode: AdvanceMode,
    pub initialized: bool,
    pub state: IntersectionState,
    pub transitions: TransitionId,
    pub actuators: HeaplessVec<ActuatorStatus, MAX_STATUS_ACTUATORS>,
}

impl StatusSnapshot {
    /// Captures controller-level fields; actuators are added by the host.
    #[must_use]
    pub fn from_controller<L>(controller: &PretimedController<L>, now: SimTime) -> Self {
        Self {
            now,
            controller_id: controller.id(),
            mode: controller.config().mode,
            initialized: controller.is_initialized(),
            state: controller.state(),
            transitions: 0,
            actuators: HeaplessVec::new(),
        }
    }

    #[must_use]
    pub const fn with_transitions(mut self, transitions: TransitionId) -> Self {
        self.transitions = transitions;
        self
    }

    /// Appends an actuator row. Returns `false` once the snapshot is full.
    pub fn push_actuator(&mut self, status: ActuatorStatus) -> bool {
        self.actuators.push(status).is_ok()
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the controller line (e.g. `controller 1 t=12.000s mode=full-cycling state=active item 0 transitions=1`).
    ///
    /// # Errors
    ///
    /// Propagates errors from `writer`.
    pub fn write_controller_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let snapshot = self.snapshot;
        write!(writer, "controller {} t=", snapshot.controller_id)?;
        write_time(writer, snapshot.now)?;
        write!(writer, " mode={}", snapshot.mode)?;
        if snapshot.initialized {
            write!(writer, " state={}", snapshot.state)?;
        } else {
            writer.write_str(" state=uninitialized")?;
        }
        write!(writer, " transitions={}", snapshot.transitions)
    }

    /// Writes one actuator line (e.g. `actuator 10 stage=1 lit=1`).
    ///
    /// # Errors
    ///
    /// Propagates errors from `writer`.
    pub fn write_actuator_line<W: fmt::Write>(
        &self,
        writer: &mut W,
        actuator: &ActuatorStatus,
    ) -> fmt::Result {
        write!(writer, "actuator {}", actuator.id)?;
        if !actuator.managed {
            writer.write_str(" unmanaged")?;
        }

        writer.write_str(" stage=")?;
        match actuator.stage {
            Some(stage) => write!(writer, "{stage}")?,
            None => writer.write_str("off")?,
        }

        writer.write_str(" lit=")?;
        if actuator.lit.is_empty() {
            return writer.write_char('-');
        }
        for (position, phase) in actuator.lit.iter().enumerate() {
            if position > 0 {
                writer.write_char(',')?;
            }
            write!(writer, "{phase}")?;
        }
        Ok(())
    }

    /// Writes the controller line followed by one line per actuator.
    ///
    /// # Errors
    ///
    /// Propagates errors from `writer`.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_controller_line(writer)?;
        for actuator in self.snapshot.actuators.iter() {
            writer.write_char('\n')?;
            self.write_actuator_line(writer, actuator)?;
        }
        Ok(())
    }
}

fn write_time<W: fmt::Write>(writer: &mut W, seconds: SimTime) -> fmt::Result {
    write!(writer, "{seconds:.3}s")
}

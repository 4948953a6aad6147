//! Signal head model used as the emulator's actuator.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use signal_core::controller::{ActuatorCommand, SignalActuator};
use signal_core::stages::Stage;
use signal_core::{ActuatorId, PhaseId, SimTime};
use tracing::debug;

/// State of one phase's lamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bulb {
    Green,
    Red,
    Dark,
}

impl Bulb {
    pub const fn as_str(self) -> &'static str {
        match self {
            Bulb::Green => "green",
            Bulb::Red => "red",
            Bulb::Dark => "dark",
        }
    }
}

impl fmt::Display for Bulb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signal head with one bulb per phase.
///
/// The head starts dark. A stage lights its phases green and every other
/// phase red; phases a stage names but the head does not carry are ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalHead {
    id: ActuatorId,
    bulbs: BTreeMap<PhaseId, Bulb>,
    program: Option<usize>,
    stage: Option<u32>,
    changed_at: Option<SimTime>,
}

impl SignalHead {
    pub fn new(id: ActuatorId, phases: impl IntoIterator<Item = PhaseId>) -> Self {
        Self {
            id,
            bulbs: phases.into_iter().map(|phase| (phase, Bulb::Dark)).collect(),
            program: None,
            stage: None,
            changed_at: None,
        }
    }

    /// Item index loaded by the last command.
    pub const fn program(&self) -> Option<usize> {
        self.program
    }

    /// Order of the stage currently shown.
    pub const fn stage_order(&self) -> Option<u32> {
        self.stage
    }

    pub const fn changed_at(&self) -> Option<SimTime> {
        self.changed_at
    }

    pub fn lit_phases(&self) -> impl Iterator<Item = PhaseId> + '_ {
        self.bulbs
            .iter()
            .filter(|(_, bulb)| **bulb == Bulb::Green)
            .map(|(phase, _)| *phase)
    }

    pub fn is_dark(&self) -> bool {
        self.bulbs.values().all(|bulb| *bulb == Bulb::Dark)
    }

    /// One-line summary, e.g. `head 10 program=0 stage=1 since=30.000s [1=red 2=green]`.
    pub fn describe(&self) -> String {
        let mut line = format!("head {}", self.id);
        match self.program() {
            Some(index) => {
                let _ = write!(line, " program={index}");
            }
            None => line.push_str(" program=none"),
        }
        match self.stage_order() {
            Some(order) => {
                let _ = write!(line, " stage={order}");
            }
            None => line.push_str(" stage=off"),
        }
        if let Some(at) = self.changed_at() {
            let _ = write!(line, " since={at:.3}s");
        }
        line.push_str(" [");
        for (position, (phase, bulb)) in self.bulbs.iter().enumerate() {
            if position > 0 {
                line.push(' ');
            }
            let _ = write!(line, "{phase}={bulb}");
        }
        line.push(']');
        line
    }

    fn set_all(&mut self, bulb: Bulb) {
        for state in self.bulbs.values_mut() {
            *state = bulb;
        }
    }
}

impl SignalActuator for SignalHead {
    fn id(&self) -> ActuatorId {
        self.id
    }

    fn turn_off(&mut self, now: SimTime) {
        self.set_all(Bulb::Dark);
        self.program = None;
        self.stage = None;
        self.changed_at = Some(now);
        debug!(actuator = self.id, now, "signal head dark");
    }

    fn apply_command(&mut self, command: &ActuatorCommand<'_>, now: SimTime) {
        self.program = command.index();
        debug!(actuator = self.id, now, program = ?self.program, "program loaded");
    }

    fn apply_stage(&mut self, stage: &Stage, now: SimTime) {
        for (phase, bulb) in &mut self.bulbs {
            *bulb = if stage.activates(*phase) {
                Bulb::Green
            } else {
                Bulb::Red
            };
        }
        self.stage = Some(stage.order());
        self.changed_at = Some(now);
        debug!(actuator = self.id, now, order = stage.order(), "stage shown");
    }
}

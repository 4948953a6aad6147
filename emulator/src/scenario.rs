//! Scenario files describing one controller and its signal heads.
//!
//! ```json
//! {
//!   "controller_id": 1,
//!   "dt": 2.0,
//!   "mode": "full-cycling",
//!   "actuators": [{ "id": 10, "phases": [1, 2] }],
//!   "schedules": [
//!     { "actuator": 10, "item": { "cycle": 60, "stages": [
//!       { "order": 0, "duration": 30, "phase_ids": [1] },
//!       { "order": 1, "duration": 30, "phase_ids": [2] }
//!     ] } }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use signal_core::controller::{AdvanceMode, ControllerConfig, DEFAULT_CONTROLLER_STEP};
use signal_core::stages::{ScheduleItem, Stage};
use signal_core::{ActuatorId, ControllerId, PhaseId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSpec {
    pub id: ActuatorId,
    pub phases: Vec<PhaseId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSpec {
    pub actuator: ActuatorId,
    pub item: ScheduleItem,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_controller_id")]
    pub controller_id: ControllerId,
    #[serde(default = "default_step")]
    pub dt: f64,
    #[serde(default)]
    pub mode: AdvanceMode,
    /// Actuators the controller is configured with; all of them when absent.
    #[serde(default)]
    pub managed: Option<Vec<ActuatorId>>,
    pub actuators: Vec<ActuatorSpec>,
    #[serde(default)]
    pub schedules: Vec<AssignmentSpec>,
}

const fn default_controller_id() -> ControllerId {
    1
}

const fn default_step() -> f64 {
    DEFAULT_CONTROLLER_STEP
}

impl Scenario {
    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Parses a scenario from JSON text.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or when two actuators share an id.
    pub fn from_json(text: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(text).context("scenario is not valid JSON")?;
        scenario.check_actuators()?;
        Ok(scenario)
    }

    /// Two heads showing a two-phase plan, switching to a shorter cycle at
    /// t=120, plus a pedestrian head with no schedule.
    pub fn builtin() -> Self {
        let two_phase = |start, cycle, split| {
            ScheduleItem::new(
                start,
                cycle,
                0.0,
                vec![
                    Stage::new(0, split, [1]),
                    Stage::new(1, cycle - split, [2]),
                ],
            )
        };

        Self {
            controller_id: default_controller_id(),
            dt: DEFAULT_CONTROLLER_STEP,
            mode: AdvanceMode::default(),
            managed: None,
            actuators: vec![
                ActuatorSpec {
                    id: 10,
                    phases: vec![1, 2],
                },
                ActuatorSpec {
                    id: 11,
                    phases: vec![1, 2],
                },
                ActuatorSpec {
                    id: 12,
                    phases: vec![3],
                },
            ],
            schedules: vec![
                AssignmentSpec {
                    actuator: 10,
                    item: two_phase(0.0, 60.0, 30.0),
                },
                AssignmentSpec {
                    actuator: 10,
                    item: two_phase(120.0, 40.0, 20.0),
                },
                AssignmentSpec {
                    actuator: 11,
                    item: two_phase(0.0, 60.0, 25.0),
                },
            ],
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AdvanceMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_step(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub const fn config(&self) -> ControllerConfig {
        ControllerConfig::new(self.dt, self.mode)
    }

    /// Actuators handed to the controller at construction.
    pub fn managed_ids(&self) -> Vec<ActuatorId> {
        match &self.managed {
            Some(ids) => ids.clone(),
            None => self.actuators.iter().map(|actuator| actuator.id).collect(),
        }
    }

    fn check_actuators(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for actuator in &self.actuators {
            if !seen.insert(actuator.id) {
                bail!("actuator {} is declared more than once", actuator.id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_scenario_with_defaults() {
        let scenario = Scenario::from_json(
            r#"{
                "actuators": [{ "id": 10, "phases": [1, 2] }],
                "schedules": [{ "actuator": 10, "item": { "stages": [
                    { "order": 1, "duration": 20, "phase_ids": [2] },
                    { "order": 0, "duration": 40, "phase_ids": [1] }
                ] } }]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.controller_id, 1);
        assert_eq!(scenario.config(), ControllerConfig::default());
        assert_eq!(scenario.managed_ids(), vec![10]);
        let item = &scenario.schedules[0].item;
        assert_eq!(item.stages()[0].order(), 0);
        assert!((item.effective_cycle() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_mode_and_managed_list() {
        let scenario = Scenario::from_json(
            r#"{
                "controller_id": 7,
                "dt": 1.5,
                "mode": "full-cycling",
                "managed": [10, 99],
                "actuators": [{ "id": 10, "phases": [1] }]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.mode, AdvanceMode::FullCycling);
        assert_eq!(scenario.managed_ids(), vec![10, 99]);
        assert!(scenario.schedules.is_empty());
        assert!((scenario.config().dt - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_duplicate_actuators() {
        let error = Scenario::from_json(
            r#"{ "actuators": [{ "id": 3, "phases": [] }, { "id": 3, "phases": [1] }] }"#,
        )
        .unwrap_err();

        assert_eq!(error.to_string(), "actuator 3 is declared more than once");
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Scenario::from_json(r#"{ "mode": "adaptive", "actuators": [] }"#).is_err());
    }

    #[test]
    fn builtin_round_trips_through_json() {
        let builtin = Scenario::builtin().with_mode(AdvanceMode::FullCycling);
        let text = serde_json::to_string(&builtin).unwrap();

        assert_eq!(Scenario::from_json(&text).unwrap(), builtin);
    }
}

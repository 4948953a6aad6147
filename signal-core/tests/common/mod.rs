#![allow(dead_code)]

use std::collections::BTreeMap;

use heapless::Vec as HeaplessVec;
use signal_core::controller::{
    ActuatorCommand, DispatchError, Dispatcher, PokeEvent, SignalActuator,
};
use signal_core::stages::{ScheduleItem, Stage};
use signal_core::{ActuatorId, PhaseId, SimTime};

/// Dispatcher that records every registered event.
pub struct MockDispatcher {
    pub now: SimTime,
    pub events: HeaplessVec<PokeEvent, 32>,
}

impl MockDispatcher {
    pub fn at(now: SimTime) -> Self {
        Self {
            now,
            events: HeaplessVec::new(),
        }
    }
}

impl Dispatcher for MockDispatcher {
    fn current_time(&self) -> SimTime {
        self.now
    }

    fn register_event(&mut self, event: PokeEvent) -> Result<(), DispatchError> {
        if event.time < self.now {
            return Err(DispatchError::PastTime {
                requested: event.time,
                now: self.now,
            });
        }
        self.events
            .push(event)
            .map_err(|_| DispatchError::Closed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorCall {
    TurnOff(SimTime),
    Command(Option<usize>),
    Stage(Vec<PhaseId>),
}

/// Actuator that records every call it receives.
pub struct MockActuator {
    pub id: ActuatorId,
    pub calls: Vec<ActuatorCall>,
}

impl MockActuator {
    pub fn new(id: ActuatorId) -> Self {
        Self {
            id,
            calls: Vec::new(),
        }
    }

    pub fn turned_off(&self) -> bool {
        self.calls
            .iter()
            .any(|call| matches!(call, ActuatorCall::TurnOff(_)))
    }

    pub fn stages(&self) -> Vec<Vec<PhaseId>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ActuatorCall::Stage(phases) => Some(phases.clone()),
                _ => None,
            })
            .collect()
    }
}

impl SignalActuator for MockActuator {
    fn id(&self) -> ActuatorId {
        self.id
    }

    fn turn_off(&mut self, now: SimTime) {
        self.calls.push(ActuatorCall::TurnOff(now));
    }

    fn apply_command(&mut self, command: &ActuatorCommand<'_>, _: SimTime) {
        self.calls.push(ActuatorCall::Command(command.index()));
    }

    fn apply_stage(&mut self, stage: &Stage, _: SimTime) {
        self.calls
            .push(ActuatorCall::Stage(stage.phase_ids().iter().copied().collect()));
    }
}

pub fn network(ids: &[ActuatorId]) -> BTreeMap<ActuatorId, MockActuator> {
    ids.iter().map(|&id| (id, MockActuator::new(id))).collect()
}

/// Two-stage item: 30 s of phase 1 then 30 s of phase 2 over a 60 s cycle.
pub fn two_phase_item(start_time: SimTime) -> ScheduleItem {
    ScheduleItem::new(
        start_time,
        60.0,
        0.0,
        vec![Stage::new(0, 30.0, [1]), Stage::new(1, 30.0, [2])],
    )
}

//! Pretimed controller state machine.
//!
//! A [`PretimedController`] owns the schedule assignment for the actuators of
//! one intersection. The dispatcher pokes it at a fixed step; each poke
//! selects the schedule item in effect, commands the actuators, and re-arms
//! the next wake-up. Actuators are owned by the network and reached through
//! an [`ActuatorRegistry`] for the duration of a call.
//!
//! Two advance modes exist. [`AdvanceMode::StrictCompat`] pins the first
//! item and its first stage for the whole run. [`AdvanceMode::FullCycling`]
//! follows item start times and walks each item's stages over its cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assignment::ScheduleAssignment;
use crate::stages::{ScheduleItem, Stage, item_index_for_time};
use crate::telemetry::{ScheduleTransition, TransitionListener, TransitionRecorder};
use crate::{ActuatorId, ControllerId, SimTime};

mod actuator;
mod dispatch;
mod error;

pub use actuator::{ActuatorCommand, ActuatorRegistry, SignalActuator};
pub use dispatch::{CONTROLLER_POKE_PRIORITY, Dispatcher, PokeEvent};
pub use error::{
    ConfigurationError, ControllerError, DispatchError, ErrorLog, ParseAdvanceModeError,
};

/// Controller wake-up interval used when a scenario does not set one.
pub const DEFAULT_CONTROLLER_STEP: f64 = 2.0;

/// How the controller moves through its schedules over time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvanceMode {
    /// Pin item 0 and its first stage; pokes never advance.
    #[default]
    StrictCompat,
    /// Select items by start time and stages by cycle position.
    FullCycling,
}

impl AdvanceMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AdvanceMode::StrictCompat => "strict-compat",
            AdvanceMode::FullCycling => "full-cycling",
        }
    }
}

impl fmt::Display for AdvanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdvanceMode {
    type Err = ParseAdvanceModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict-compat" | "strict" => Ok(AdvanceMode::StrictCompat),
            "full-cycling" | "full" => Ok(AdvanceMode::FullCycling),
            _ => Err(ParseAdvanceModeError(value.to_owned())),
        }
    }
}

/// Tunables for a controller.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds between wake-ups.
    pub dt: f64,
    pub mode: AdvanceMode,
}

impl ControllerConfig {
    #[must_use]
    pub const fn new(dt: f64, mode: AdvanceMode) -> Self {
        Self { dt, mode }
    }

    #[must_use]
    pub const fn with_step(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: AdvanceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns `true` when `dt` is usable as a wake-up interval.
    #[must_use]
    pub fn has_valid_step(&self) -> bool {
        self.dt.is_finite() && self.dt > 0.0
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROLLER_STEP, AdvanceMode::default())
    }
}

/// What the intersection is showing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IntersectionState {
    /// Following the schedule item at this index.
    Active(usize),
    /// All managed actuators are off.
    Dark,
}

impl IntersectionState {
    #[must_use]
    pub const fn from_index(index: Option<usize>) -> Self {
        match index {
            Some(index) => IntersectionState::Active(index),
            None => IntersectionState::Dark,
        }
    }

    #[must_use]
    pub const fn is_dark(self) -> bool {
        matches!(self, IntersectionState::Dark)
    }
}

impl fmt::Display for IntersectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntersectionState::Active(index) => write!(f, "active item {index}"),
            IntersectionState::Dark => f.write_str("dark"),
        }
    }
}

/// Stage last sent to an actuator; `None` means it was turned off.
type AppliedStage = Option<usize>;

/// Pretimed controller for one intersection.
#[derive(Debug)]
pub struct PretimedController<L = TransitionRecorder> {
    id: ControllerId,
    config: ControllerConfig,
    assignment: ScheduleAssignment,
    configured: BTreeSet<ActuatorId>,
    managed: BTreeSet<ActuatorId>,
    current_index: Option<usize>,
    applied: BTreeMap<ActuatorId, AppliedStage>,
    initialized: bool,
    listener: Option<L>,
}

impl<L> PretimedController<L> {
    /// Creates a controller for the given actuators without a listener.
    ///
    /// Schedules are not inspected until [`initialize`](Self::initialize).
    pub fn new(
        id: ControllerId,
        config: ControllerConfig,
        managed: impl IntoIterator<Item = ActuatorId>,
    ) -> Self {
        let configured: BTreeSet<ActuatorId> = managed.into_iter().collect();
        Self {
            id,
            config,
            assignment: ScheduleAssignment::new(),
            managed: configured.clone(),
            configured,
            current_index: None,
            applied: BTreeMap::new(),
            initialized: false,
            listener: None,
        }
    }

    /// Attaches `listener` and returns the controller.
    #[must_use]
    pub fn with_listener(mut self, listener: L) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub const fn id(&self) -> ControllerId {
        self.id
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub const fn assignment(&self) -> &ScheduleAssignment {
        &self.assignment
    }

    /// Actuators under control. Shrinks to the scheduled ones at initialize.
    #[must_use]
    pub const fn managed_actuators(&self) -> &BTreeSet<ActuatorId> {
        &self.managed
    }

    #[must_use]
    pub const fn current_schedule_item_index(&self) -> Option<usize> {
        self.current_index
    }

    #[must_use]
    pub const fn state(&self) -> IntersectionState {
        IntersectionState::from_index(self.current_index)
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Stage index last applied to `actuator`, if it is lit.
    #[must_use]
    pub fn applied_stage(&self, actuator: ActuatorId) -> Option<usize> {
        self.applied.get(&actuator).copied().flatten()
    }

    #[must_use]
    pub const fn listener(&self) -> Option<&L> {
        self.listener.as_ref()
    }

    #[must_use]
    pub const fn listener_mut(&mut self) -> Option<&mut L> {
        self.listener.as_mut()
    }

    pub fn set_listener(&mut self, listener: L) {
        self.listener = Some(listener);
    }

    #[must_use]
    pub fn take_listener(&mut self) -> Option<L> {
        self.listener.take()
    }

    /// Appends `item` to the actuator's schedule list.
    pub fn assign_schedule(&mut self, actuator: ActuatorId, item: ScheduleItem) {
        debug!(
            controller = self.id,
            actuator,
            start_time = item.start_time(),
            stages = item.stages().len(),
            "schedule assigned"
        );
        self.assignment.assign(actuator, item);
    }

    /// Assigns a fixed-time item with one stage per duration.
    pub fn assign_schedule_durations(&mut self, actuator: ActuatorId, durations: &[f64]) {
        self.assign_schedule(actuator, ScheduleItem::from_durations(durations));
    }

    /// Command the actuator should currently follow.
    ///
    /// Actuators outside the managed set get [`ActuatorCommand::NoCommand`].
    #[must_use]
    pub fn get_command_for(&self, actuator: ActuatorId) -> ActuatorCommand<'_> {
        if !self.managed.contains(&actuator) {
            return ActuatorCommand::NoCommand;
        }

        match self.config.mode {
            AdvanceMode::StrictCompat => command_at(self.assignment.get_all(actuator), 0),
            AdvanceMode::FullCycling => match self.current_index {
                Some(index) => command_at(self.assignment.get_all(actuator), index),
                None => ActuatorCommand::NoCommand,
            },
        }
    }

    /// Checks the assigned schedules and appends every finding to `log`.
    ///
    /// Returns the number of findings. Controller state is left untouched.
    pub fn validate<E>(&self, log: &mut E) -> usize
    where
        E: ErrorLog + ?Sized,
    {
        let mut log = TracingLog::new(self.id, log);

        for (actuator, items) in self.assignment.iter() {
            if !self.configured.contains(&actuator) {
                log.append(ConfigurationError::UnmanagedActuator {
                    controller: self.id,
                    actuator,
                });
            }

            let mut previous: Option<SimTime> = None;
            for (position, item) in items.iter().enumerate() {
                item.validate(actuator, position, &mut log);
                if let Some(previous) = previous
                    && item.start_time() <= previous
                {
                    log.append(ConfigurationError::NonMonotonicStart {
                        actuator,
                        position,
                        start_time: item.start_time(),
                        previous,
                    });
                }
                previous = Some(item.start_time());
            }
        }

        for &actuator in &self.configured {
            if !self.assignment.has(actuator) {
                log.append(ConfigurationError::MissingSchedule {
                    controller: self.id,
                    actuator,
                });
            }
        }

        log.count
    }

    /// Schedules the first wake-up one step after the dispatcher's clock.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidStep`] when the configured step is
    /// not positive and finite or is too small to advance the clock, or
    /// [`ControllerError::Dispatch`] when the dispatcher refuses the event.
    pub fn register_with_dispatcher<D>(&self, dispatcher: &mut D) -> Result<(), ControllerError>
    where
        D: Dispatcher + ?Sized,
    {
        let at = dispatcher.current_time();
        self.schedule_poke(dispatcher, at)
    }

    fn schedule_poke<D>(&self, dispatcher: &mut D, from: SimTime) -> Result<(), ControllerError>
    where
        D: Dispatcher + ?Sized,
    {
        if !self.config.has_valid_step() {
            return Err(ControllerError::InvalidStep(self.config.dt));
        }

        // The step must advance the clock at this magnitude.
        let next = from + self.config.dt;
        if next <= from {
            return Err(ControllerError::InvalidStep(self.config.dt));
        }

        let event = PokeEvent::new(self.id, next);
        dispatcher.register_event(event)?;
        debug!(controller = self.id, time = event.time, "poke scheduled");
        Ok(())
    }
}

impl<L> PretimedController<L>
where
    L: TransitionListener,
{
    /// Prunes unscheduled actuators and brings the intersection up.
    ///
    /// With no usable item every originally configured actuator is turned
    /// off. Otherwise each managed actuator receives its item and stage, and
    /// one transition is reported.
    pub fn initialize<R>(&mut self, now: SimTime, network: &mut R)
    where
        R: ActuatorRegistry + ?Sized,
    {
        let assignment = &self.assignment;
        self.managed = self
            .configured
            .iter()
            .copied()
            .filter(|&actuator| assignment.has(actuator))
            .collect();
        for dropped in self.configured.difference(&self.managed) {
            warn!(
                controller = self.id,
                actuator = *dropped,
                "actuator has no schedule and is no longer managed"
            );
        }

        self.current_index = match self.config.mode {
            AdvanceMode::StrictCompat => (!self.managed.is_empty()).then_some(0),
            AdvanceMode::FullCycling => self.select_index(now),
        };
        self.applied.clear();
        self.initialized = true;

        match self.current_index {
            None => {
                for &actuator in &self.configured {
                    if let Some(device) = lookup(network, self.id, actuator) {
                        device.turn_off(now);
                    }
                }
                info!(
                    controller = self.id,
                    actuators = self.configured.len(),
                    "no schedule in effect; intersection dark"
                );
            }
            Some(index) => {
                info!(
                    controller = self.id,
                    index,
                    mode = %self.config.mode,
                    actuators = self.managed.len(),
                    "controller initialized"
                );
                self.command_all(network, now);
                self.refresh_stages(network, now);
                self.notify(now, Some(index));
            }
        }
    }

    /// Handles a dispatcher wake-up and re-arms the next one.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotInitialized`] before
    /// [`initialize`](Self::initialize), and the same errors as
    /// [`register_with_dispatcher`](Self::register_with_dispatcher) when the
    /// next wake-up cannot be scheduled.
    pub fn poke<D, R>(
        &mut self,
        dispatcher: &mut D,
        network: &mut R,
        timestamp: SimTime,
    ) -> Result<(), ControllerError>
    where
        D: Dispatcher + ?Sized,
        R: ActuatorRegistry + ?Sized,
    {
        if !self.initialized {
            return Err(ControllerError::NotInitialized);
        }

        self.update_controller(network, timestamp);
        self.schedule_poke(dispatcher, timestamp)
    }

    /// Re-evaluates the schedule at `timestamp`.
    ///
    /// Does nothing in [`AdvanceMode::StrictCompat`].
    pub fn update_controller<R>(&mut self, network: &mut R, timestamp: SimTime)
    where
        R: ActuatorRegistry + ?Sized,
    {
        if self.config.mode == AdvanceMode::StrictCompat {
            return;
        }

        let next = self.select_index(timestamp);
        if next != self.current_index {
            self.current_index = next;
            match next {
                Some(index) => {
                    info!(controller = self.id, index, timestamp, "schedule item changed");
                    self.applied.clear();
                    self.command_all(network, timestamp);
                }
                None => {
                    info!(controller = self.id, timestamp, "intersection dark");
                    for &actuator in &self.managed {
                        if let Some(device) = lookup(network, self.id, actuator) {
                            device.turn_off(timestamp);
                        }
                        self.applied.insert(actuator, None);
                    }
                }
            }
            self.notify(timestamp, next);
        }

        if self.current_index.is_some() {
            self.refresh_stages(network, timestamp);
        }
    }

    /// Index chosen from the lead actuator, which is the smallest managed id.
    fn select_index(&self, time: SimTime) -> Option<usize> {
        let lead = self.managed.first()?;
        item_index_for_time(self.assignment.get_all(*lead), time)
    }

    fn command_all<R>(&self, network: &mut R, now: SimTime)
    where
        R: ActuatorRegistry + ?Sized,
    {
        for &actuator in &self.managed {
            let command = self.get_command_for(actuator);
            if let Some(device) = lookup(network, self.id, actuator) {
                device.apply_command(&command, now);
            }
        }
    }

    fn refresh_stages<R>(&mut self, network: &mut R, now: SimTime)
    where
        R: ActuatorRegistry + ?Sized,
    {
        let Some(index) = self.current_index else {
            return;
        };

        for &actuator in &self.managed {
            let items = self.assignment.get_all(actuator);
            let Some(item) = items.get(clamp_index(index, items.len())) else {
                continue;
            };

            let stage = stage_for(self.config.mode, item, now);
            let next = stage.map(|(position, _)| position);
            if self.applied.get(&actuator) == Some(&next) {
                continue;
            }

            let Some(device) = lookup(network, self.id, actuator) else {
                continue;
            };
            match stage {
                Some((position, stage)) => {
                    debug!(controller = self.id, actuator, stage = position, "stage applied");
                    device.apply_stage(stage, now);
                }
                None => {
                    warn!(
                        controller = self.id,
                        actuator, "schedule item has no usable stage; turning actuator off"
                    );
                    device.turn_off(now);
                }
            }
            self.applied.insert(actuator, next);
        }
    }

    fn notify(&mut self, timestamp: SimTime, new_index: Option<usize>) {
        if let Some(listener) = self.listener.as_mut() {
            let transition = ScheduleTransition::new(timestamp, self.id, new_index);
            listener.write(timestamp, &transition);
        }
    }
}

impl<L> PretimedController<L> {
    /// Multi-line diagnostic summary.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl<L> fmt::Display for PretimedController<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "controller {} ({}, dt {}s): {}",
            self.id,
            self.config.mode,
            self.config.dt,
            self.state()
        )?;
        for &actuator in &self.configured {
            let items = self.assignment.get_all(actuator);
            let role = if self.managed.contains(&actuator) {
                "managed"
            } else {
                "dropped"
            };
            write!(f, "  actuator {actuator} [{role}]: {} item(s)", items.len())?;
            match self.applied.get(&actuator) {
                Some(Some(stage)) => writeln!(f, ", stage {stage}")?,
                Some(None) => writeln!(f, ", off")?,
                None => writeln!(f)?,
            }
        }
        for actuator in self.assignment.actuator_ids() {
            if !self.configured.contains(&actuator) {
                writeln!(f, "  actuator {actuator} [unmanaged]")?;
            }
        }
        Ok(())
    }
}

fn command_at(items: &[ScheduleItem], index: usize) -> ActuatorCommand<'_> {
    let index = clamp_index(index, items.len());
    match items.get(index) {
        Some(item) => ActuatorCommand::ScheduleItem { index, item },
        None => ActuatorCommand::NoCommand,
    }
}

/// Lists shorter than the lead actuator's stay on their last item.
fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

fn stage_for(mode: AdvanceMode, item: &ScheduleItem, now: SimTime) -> Option<(usize, &Stage)> {
    match mode {
        AdvanceMode::StrictCompat => item.stages().first().map(|stage| (0, stage)),
        AdvanceMode::FullCycling => item.stage_at(now),
    }
}

fn lookup<'a, R>(
    network: &'a mut R,
    controller: ControllerId,
    actuator: ActuatorId,
) -> Option<&'a mut dyn SignalActuator>
where
    R: ActuatorRegistry + ?Sized,
{
    let device = network.actuator_mut(actuator);
    if device.is_none() {
        warn!(controller, actuator, "actuator missing from network; skipped");
    }
    device
}

/// Forwards findings to the caller's log and emits each as a warning.
struct TracingLog<'a, E: ?Sized> {
    controller: ControllerId,
    inner: &'a mut E,
    count: usize,
}

impl<'a, E> TracingLog<'a, E>
where
    E: ErrorLog + ?Sized,
{
    fn new(controller: ControllerId, inner: &'a mut E) -> Self {
        Self {
            controller,
            inner,
            count: 0,
        }
    }
}

impl<E> ErrorLog for TracingLog<'_, E>
where
    E: ErrorLog + ?Sized,
{
    fn append(&mut self, error: ConfigurationError) {
        warn!(controller = self.controller, %error, "schedule configuration problem");
        self.count += 1;
        self.inner.append(error);
    }
}

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use signal_core::controller::{
    AdvanceMode, ConfigurationError, ControllerError, Dispatcher, PretimedController,
};
use signal_core::repl::catalog::CommandSpec;
use signal_core::repl::commands::{
    AssignAck, CommandError, CommandExecutor, CommandOutcome, HelpReply, RunReport,
    SimulationHost,
};
use signal_core::repl::status::{ActuatorStatus, StatusFormatter, StatusSnapshot};
use signal_core::telemetry::{TransitionId, TransitionRecorder};
use signal_core::{ActuatorId, SimTime};
use tracing::{info, warn};

use crate::dispatcher::EventQueue;
use crate::scenario::Scenario;
use crate::signal::SignalHead;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    StrictCompat,
    FullCycling,
}

impl TranscriptProfile {
    pub const fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::StrictCompat => "transcripts/emulator-strict-compat.log",
            TranscriptProfile::FullCycling => "transcripts/emulator-full-cycling.log",
        }
    }

    pub const fn header(self) -> &'static str {
        match self {
            TranscriptProfile::StrictCompat => "Signal emulator strict-compat transcript",
            TranscriptProfile::FullCycling => "Signal emulator full-cycling transcript",
        }
    }

    pub const fn for_mode(mode: AdvanceMode) -> Self {
        match mode {
            AdvanceMode::StrictCompat => TranscriptProfile::StrictCompat,
            AdvanceMode::FullCycling => TranscriptProfile::FullCycling,
        }
    }
}

/// Event queue, signal heads and the controller driving them.
///
/// The controller is initialized and registered with the queue on the first
/// `run`, so assignments made from the console before that are picked up.
pub struct Simulation {
    queue: EventQueue,
    network: BTreeMap<ActuatorId, SignalHead>,
    controller: PretimedController<TransitionRecorder>,
    started: bool,
}

impl Simulation {
    pub fn from_scenario(scenario: &Scenario) -> Self {
        let network = scenario
            .actuators
            .iter()
            .map(|spec| (spec.id, SignalHead::new(spec.id, spec.phases.iter().copied())))
            .collect();

        let mut controller = PretimedController::new(
            scenario.controller_id,
            scenario.config(),
            scenario.managed_ids(),
        )
        .with_listener(TransitionRecorder::new());
        for assignment in &scenario.schedules {
            controller.assign_schedule(assignment.actuator, assignment.item.clone());
        }

        Self {
            queue: EventQueue::new(0.0),
            network,
            controller,
            started: false,
        }
    }

    fn transitions(&self) -> TransitionId {
        self.controller
            .listener()
            .map_or(0, TransitionRecorder::total_recorded)
    }

    fn start(&mut self) -> Result<(), ControllerError> {
        let mut findings: Vec<ConfigurationError> = Vec::new();
        let count = self.controller.validate(&mut findings);
        if count > 0 {
            warn!(
                controller = self.controller.id(),
                count, "scenario has configuration findings"
            );
        }

        let now = self.queue.current_time();
        self.controller.initialize(now, &mut self.network);
        self.controller.register_with_dispatcher(&mut self.queue)?;
        self.started = true;
        info!(controller = self.controller.id(), now, "simulation started");
        Ok(())
    }
}

impl SimulationHost for Simulation {
    type Error = ControllerError;

    fn now(&self) -> SimTime {
        self.queue.current_time()
    }

    fn assign_durations(
        &mut self,
        actuator: ActuatorId,
        durations: &[f64],
    ) -> Result<(), Self::Error> {
        self.controller.assign_schedule_durations(actuator, durations);
        if self.started {
            info!(
                actuator,
                "assignment recorded; managed set is fixed until the next initialization"
            );
        }
        Ok(())
    }

    fn run_for(&mut self, duration: f64) -> Result<RunReport, Self::Error> {
        let before = self.transitions();
        if !self.started {
            self.start()?;
        }

        let started_at = self.queue.current_time();
        let end = started_at + duration;
        let controller = &mut self.controller;
        let network = &mut self.network;
        let pokes = self.queue.run_until(end, |queue, event| {
            if event.target != controller.id() {
                warn!(target = event.target, "event for unknown controller dropped");
                return Ok(());
            }
            controller.poke(queue, network, event.time)
        })?;

        Ok(RunReport {
            started_at,
            finished_at: self.queue.current_time(),
            pokes,
            transitions: usize::try_from(self.transitions().wrapping_sub(before))
                .unwrap_or(usize::MAX),
        })
    }

    fn status(&self) -> StatusSnapshot {
        let controller = &self.controller;
        let mut snapshot = StatusSnapshot::from_controller(controller, self.now())
            .with_transitions(self.transitions());
        for (&id, head) in &self.network {
            let row = ActuatorStatus::new(
                id,
                controller.managed_actuators().contains(&id),
                controller.applied_stage(id),
            )
            .with_lit(head.lit_phases());
            if !snapshot.push_actuator(row) {
                break;
            }
        }
        snapshot
    }

    fn describe(&self) -> String {
        let mut text = self.controller.describe();
        for head in self.network.values() {
            text.push_str("  ");
            text.push_str(&head.describe());
            text.push('\n');
        }
        if self.queue.is_empty() {
            text.push_str("  queue idle");
        } else {
            let _ = write!(text, "  queue: {} pending", self.queue.len());
            if let Some(next) = self.queue.peek_time() {
                let _ = write!(text, ", next at {next:.3}s");
            }
        }
        let _ = writeln!(text, ", {} delivered", self.queue.delivered());
        if let Some(latest) = self.controller.listener().and_then(TransitionRecorder::latest) {
            let _ = writeln!(text, "  last transition #{}: {}", latest.id, latest.transition);
        }
        text
    }
}

pub struct Session {
    executor: CommandExecutor<Simulation>,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            executor: CommandExecutor::new(Simulation::from_scenario(scenario)),
            transcript: None,
        }
    }

    /// Records every command and response to `path`.
    ///
    /// # Errors
    ///
    /// Fails when the transcript file cannot be created.
    pub fn with_transcript(mut self, path: &Path, header: &str) -> Result<Self> {
        let logger = TranscriptLogger::create(path, header)
            .with_context(|| format!("failed to open transcript {}", path.display()))?;
        self.transcript = Some(logger);
        Ok(self)
    }

    /// Executes one console line and returns the response lines.
    ///
    /// # Errors
    ///
    /// Only transcript I/O failures are returned; command failures become
    /// `ERR` responses.
    pub fn handle_command(&mut self, line: &str) -> Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.log(TranscriptRole::Host, trimmed)?;

        let responses = match self.executor.execute(trimmed) {
            Ok(outcome) => render_outcome(outcome)?,
            Err(error) => vec![render_error(&error)],
        };

        for response in &responses {
            self.log(TranscriptRole::Emulator, response)?;
        }
        Ok(responses)
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> Result<()> {
        let now = self.executor.host().now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript
                .append_line(now, role, line)
                .context("failed to write transcript")?;
        }
        Ok(())
    }
}

fn render_outcome(outcome: CommandOutcome) -> Result<Vec<String>> {
    let lines = match outcome {
        CommandOutcome::Assigned(ack) => vec![render_assign(ack)],
        CommandOutcome::Ran(report) => vec![format!(
            "OK t={:.3}s pokes={} transitions={}",
            report.finished_at, report.pokes, report.transitions
        )],
        CommandOutcome::Status(snapshot) => {
            let mut text = String::new();
            StatusFormatter::new(&snapshot).write_all(&mut text)?;
            text.lines().map(String::from).collect()
        }
        CommandOutcome::Described(text) => text.lines().map(String::from).collect(),
        CommandOutcome::Help(HelpReply::Catalog(entries)) => {
            let mut lines = vec![String::from("Commands:")];
            lines.extend(entries.iter().map(help_line));
            lines.push(format!("  {:<32} - leave the console", "exit | quit"));
            lines
        }
        CommandOutcome::Help(HelpReply::Command(spec)) => vec![help_line(spec)],
    };
    Ok(lines)
}

fn render_assign(ack: AssignAck) -> String {
    format!(
        "OK actuator {} += {} stage(s), cycle {:.1}s",
        ack.actuator, ack.stages, ack.cycle
    )
}

fn render_error<E: std::fmt::Display>(error: &CommandError<'_, E>) -> String {
    match error {
        CommandError::Parse(err) => format!("ERR syntax {err}"),
        CommandError::Rejected(reason) => format!("ERR {reason}"),
        CommandError::Host(err) => format!("ERR {err}"),
    }
}

fn help_line(spec: &CommandSpec) -> String {
    format!("  {:<32} - {}", spec.usage, spec.summary)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    const fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(header)?;
        Ok(logger)
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        writeln!(self.writer, "# {header}")?;
        writeln!(self.writer, "# Timestamps are simulated seconds")?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, now: SimTime, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[t={now:>9.3}s] {} {line}", role.prefix())?;
        self.writer.flush()
    }
}

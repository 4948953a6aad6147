//! High-level console command dispatcher.
//!
//! This module glues parsed console commands to a simulation host: schedule
//! assignment, time advancement, and the read-only status and describe
//! views. Arguments the grammar accepts but the controller cannot use are
//! rejected here before the host sees them.

use core::fmt;

use crate::{ActuatorId, SimTime};

use super::catalog::{self, CommandSpec};
use super::grammar::{self, AssignCommand, Command, HelpCommand, RunCommand};
use super::status::StatusSnapshot;

/// Command execution successes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Assigned(AssignAck),
    Ran(RunReport),
    Status(StatusSnapshot),
    Described(String),
    Help(HelpReply),
}

/// Summary returned after assigning a fixed-time item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssignAck {
    pub actuator: ActuatorId,
    pub stages: usize,
    /// Cycle length implied by the durations, in seconds.
    pub cycle: f64,
}

/// Summary returned by the host after advancing time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunReport {
    pub started_at: SimTime,
    pub finished_at: SimTime,
    /// Controller wake-ups delivered during the run.
    pub pokes: usize,
    /// Schedule transitions reported during the run.
    pub transitions: usize,
}

/// Catalog entries selected by `help`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelpReply {
    Catalog(&'static [CommandSpec]),
    Command(&'static CommandSpec),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a, E> {
    Parse(grammar::ParseError<'a>),
    Rejected(&'static str),
    Host(E),
}

impl<'a, E> From<grammar::ParseError<'a>> for CommandError<'a, E> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl<E> fmt::Display for CommandError<'_, E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(err) => write!(f, "parse error: {err}"),
            CommandError::Rejected(reason) => f.write_str(reason),
            CommandError::Host(err) => write!(f, "host error: {err}"),
        }
    }
}

type CommandResult<'a, H> = Result<CommandOutcome, CommandError<'a, <H as SimulationHost>::Error>>;

/// Simulation surface driven by the console.
pub trait SimulationHost {
    type Error;

    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Appends a fixed-time item with one stage per duration.
    ///
    /// # Errors
    ///
    /// Returns a host-specific error when the actuator cannot take a schedule.
    fn assign_durations(
        &mut self,
        actuator: ActuatorId,
        durations: &[f64],
    ) -> Result<(), Self::Error>;

    /// Advances simulated time by `duration` seconds.
    ///
    /// # Errors
    ///
    /// Returns a host-specific error when the dispatcher or controller fails.
    fn run_for(&mut self, duration: f64) -> Result<RunReport, Self::Error>;

    fn status(&self) -> StatusSnapshot;

    fn describe(&self) -> String;
}

/// Dispatches console commands into a simulation host.
pub struct CommandExecutor<H> {
    host: H,
}

impl<H> CommandExecutor<H> {
    /// Creates a new executor around the provided host.
    pub const fn new(host: H) -> Self {
        Self { host }
    }

    /// Returns an immutable reference to the underlying host.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Returns a mutable reference to the underlying host.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consumes the executor and yields the inner host.
    pub fn into_inner(self) -> H {
        self.host
    }
}

impl<H> CommandExecutor<H>
where
    H: SimulationHost,
{
    /// Parses and executes a console command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Parse`] for malformed lines,
    /// [`CommandError::Rejected`] for arguments the controller cannot use,
    /// and [`CommandError::Host`] when the host fails.
    pub fn execute<'a>(&mut self, line: &'a str) -> CommandResult<'a, H> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    /// Executes an already parsed command.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), minus parse failures.
    pub fn dispatch<'a>(&mut self, command: Command<'a>) -> CommandResult<'a, H> {
        match command {
            Command::Assign(assign) => self.handle_assign(&assign).map(CommandOutcome::Assigned),
            Command::Run(run) => self.handle_run(run).map(CommandOutcome::Ran),
            Command::Status => Ok(CommandOutcome::Status(self.host.status())),
            Command::Describe => Ok(CommandOutcome::Described(self.host.describe())),
            Command::Help(help) => handle_help(help).map(CommandOutcome::Help),
        }
    }

    fn handle_assign<'a>(
        &mut self,
        assign: &AssignCommand,
    ) -> Result<AssignAck, CommandError<'a, H::Error>> {
        let durations = assign.durations.as_slice();
        if durations.is_empty() {
            return Err(CommandError::Rejected("assign needs at least one duration"));
        }
        if durations
            .iter()
            .any(|duration| !duration.is_finite() || *duration < 0.0)
        {
            return Err(CommandError::Rejected(
                "stage durations must be non-negative",
            ));
        }

        self.host
            .assign_durations(assign.actuator, durations)
            .map_err(CommandError::Host)?;

        Ok(AssignAck {
            actuator: assign.actuator,
            stages: durations.len(),
            cycle: durations.iter().sum(),
        })
    }

    fn handle_run<'a>(&mut self, run: RunCommand) -> Result<RunReport, CommandError<'a, H::Error>> {
        if !run.duration.is_finite() || run.duration <= 0.0 {
            return Err(CommandError::Rejected("run length must be positive"));
        }

        self.host.run_for(run.duration).map_err(CommandError::Host)
    }
}

fn handle_help<'a, E>(help: HelpCommand<'_>) -> Result<HelpReply, CommandError<'a, E>> {
    match help.topic {
        None => Ok(HelpReply::Catalog(catalog::commands())),
        Some(topic) => catalog::find(topic)
            .map(HelpReply::Command)
            .ok_or(CommandError::Rejected("unknown help topic")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerConfig, PretimedController};
    use crate::repl::catalog::CommandTag;

    #[derive(Debug, PartialEq)]
    enum MockError {
        Busy,
    }

    struct MockHost {
        now: SimTime,
        assigned: Vec<(ActuatorId, Vec<f64>)>,
        fail_runs: bool,
    }

    impl MockHost {
        fn new() -> Self {
            Self {
                now: 0.0,
                assigned: Vec::new(),
                fail_runs: false,
            }
        }
    }

    impl SimulationHost for MockHost {
        type Error = MockError;

        fn now(&self) -> SimTime {
            self.now
        }

        fn assign_durations(
            &mut self,
            actuator: ActuatorId,
            durations: &[f64],
        ) -> Result<(), Self::Error> {
            self.assigned.push((actuator, durations.to_vec()));
            Ok(())
        }

        fn run_for(&mut self, duration: f64) -> Result<RunReport, Self::Error> {
            if self.fail_runs {
                return Err(MockError::Busy);
            }
            let started_at = self.now;
            self.now += duration;
            Ok(RunReport {
                started_at,
                finished_at: self.now,
                pokes: 3,
                transitions: 0,
            })
        }

        fn status(&self) -> StatusSnapshot {
            let controller: PretimedController =
                PretimedController::new(1, ControllerConfig::default(), [1]);
            StatusSnapshot::from_controller(&controller, self.now)
        }

        fn describe(&self) -> String {
            String::from("controller 1")
        }
    }

    #[test]
    fn assign_forwards_durations() {
        let mut executor = CommandExecutor::new(MockHost::new());

        let outcome = executor
            .execute("assign 10 30s 25s")
            .expect("dispatch should succeed");

        assert_eq!(
            outcome,
            CommandOutcome::Assigned(AssignAck {
                actuator: 10,
                stages: 2,
                cycle: 55.0,
            })
        );
        assert_eq!(executor.host().assigned, vec![(10, vec![30.0, 25.0])]);
    }

    #[test]
    fn assign_rejects_negative_durations() {
        let mut executor = CommandExecutor::new(MockHost::new());

        let error = executor
            .execute("assign 10 30 -1")
            .expect_err("negative duration should fail");

        assert_eq!(
            error,
            CommandError::Rejected("stage durations must be non-negative")
        );
        assert!(executor.host().assigned.is_empty());
    }

    #[test]
    fn dispatch_rejects_empty_duration_list() {
        let mut executor = CommandExecutor::new(MockHost::new());

        let error = executor
            .dispatch(Command::Assign(AssignCommand {
                actuator: 4,
                durations: grammar::DurationList::new(),
            }))
            .expect_err("empty list should fail");

        assert_eq!(
            error,
            CommandError::Rejected("assign needs at least one duration")
        );
    }

    #[test]
    fn run_advances_host_time() {
        let mut executor = CommandExecutor::new(MockHost::new());

        let outcome = executor.execute("run 1500ms").expect("run should succeed");

        match outcome {
            CommandOutcome::Ran(report) => {
                assert!((report.finished_at - 1.5).abs() < 1e-9);
                assert_eq!(report.pokes, 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!((executor.host().now() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn run_rejects_zero_length() {
        let mut executor = CommandExecutor::new(MockHost::new());

        let error = executor.execute("run 0").expect_err("zero run should fail");

        assert_eq!(error, CommandError::Rejected("run length must be positive"));
    }

    #[test]
    fn host_errors_are_wrapped() {
        let mut host = MockHost::new();
        host.fail_runs = true;
        let mut executor = CommandExecutor::new(host);

        let error = executor.execute("run 10").expect_err("host should fail");

        assert_eq!(error, CommandError::Host(MockError::Busy));
    }

    #[test]
    fn parse_error_is_returned() {
        let mut executor = CommandExecutor::new(MockHost::new());

        let error = executor
            .execute("run later please")
            .expect_err("parse should fail");

        assert!(matches!(error, CommandError::Parse(_)));
    }

    #[test]
    fn help_selects_catalog_entries() {
        let mut executor = CommandExecutor::new(MockHost::new());

        match executor.execute("help").expect("help should succeed") {
            CommandOutcome::Help(HelpReply::Catalog(entries)) => assert_eq!(entries.len(), 5),
            other => panic!("unexpected outcome: {other:?}"),
        }

        match executor.execute("help run").expect("help should succeed") {
            CommandOutcome::Help(HelpReply::Command(spec)) => assert_eq!(spec.tag, CommandTag::Run),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let error = executor
            .execute("help reboot")
            .expect_err("unknown topic should fail");
        assert_eq!(error, CommandError::Rejected("unknown help topic"));
    }

    #[test]
    fn status_and_describe_come_from_host() {
        let mut executor = CommandExecutor::new(MockHost::new());

        match executor.execute("status").expect("status should succeed") {
            CommandOutcome::Status(snapshot) => assert_eq!(snapshot.controller_id, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            executor.execute("describe").expect("describe should succeed"),
            CommandOutcome::Described(String::from("controller 1"))
        );
    }
}

mod dispatcher;
mod scenario;
mod session;
mod signal;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use signal_core::controller::AdvanceMode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scenario::Scenario;
use session::{Session, TranscriptProfile};

#[derive(Debug, Parser)]
#[command(name = "signal-emulator")]
#[command(about = "Interactive console for a pretimed signal controller")]
struct Args {
    /// Scenario JSON file; a built-in two-head scenario is used when omitted
    #[arg(long, value_name = "PATH")]
    scenario: Option<PathBuf>,

    /// Advance mode, overriding the scenario (strict-compat or full-cycling)
    #[arg(long, value_name = "MODE")]
    mode: Option<AdvanceMode>,

    /// Controller step in seconds, overriding the scenario
    #[arg(long, value_name = "SECONDS")]
    dt: Option<f64>,

    /// Record the session; without a path the mode's default log is used
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    transcript: Option<Option<PathBuf>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::builtin(),
    };
    if let Some(mode) = args.mode {
        scenario = scenario.with_mode(mode);
    }
    if let Some(dt) = args.dt {
        scenario = scenario.with_step(dt);
    }
    info!(
        controller = scenario.controller_id,
        mode = %scenario.mode,
        dt = scenario.dt,
        actuators = scenario.actuators.len(),
        "scenario loaded"
    );

    let mut session = Session::new(&scenario);
    if let Some(path) = args.transcript {
        let profile = TranscriptProfile::for_mode(scenario.mode);
        let path = path.unwrap_or_else(|| PathBuf::from(profile.log_path()));
        session = session.with_transcript(&path, profile.header())?;
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Signal controller emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

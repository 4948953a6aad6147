use std::path::Path;

use anyhow::Result;
use signal_core::controller::AdvanceMode;

#[allow(dead_code)]
#[path = "../dispatcher.rs"]
mod dispatcher;
#[allow(dead_code)]
#[path = "../scenario.rs"]
mod scenario;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../signal.rs"]
mod signal;

use scenario::Scenario;
use session::{Session, TranscriptProfile};

fn main() -> Result<()> {
    record_profile(TranscriptProfile::StrictCompat)?;
    record_profile(TranscriptProfile::FullCycling)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> Result<()> {
    let mode = match profile {
        TranscriptProfile::StrictCompat => AdvanceMode::StrictCompat,
        TranscriptProfile::FullCycling => AdvanceMode::FullCycling,
    };
    let scenario = Scenario::builtin().with_mode(mode);
    let mut session =
        Session::new(&scenario).with_transcript(Path::new(profile.log_path()), profile.header())?;
    match profile {
        TranscriptProfile::StrictCompat => record_strict(&mut session),
        TranscriptProfile::FullCycling => record_full(&mut session),
    }
}

fn record_strict(session: &mut Session) -> Result<()> {
    let _ = session.handle_command("help")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("run 30s")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("run 2m")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("describe")?;
    Ok(())
}

fn record_full(session: &mut Session) -> Result<()> {
    let _ = session.handle_command("assign 12 45s 15s")?;
    let _ = session.handle_command("run 20")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("run 20")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("run 90")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("run -5")?;
    let _ = session.handle_command("help run")?;
    let _ = session.handle_command("describe")?;
    Ok(())
}

use std::sync::OnceLock;

use benchsweep::StopSignal;

use crate::error::{CliError, Result};

static STOP: OnceLock<StopSignal> = OnceLock::new();

#[cfg(unix)]
extern "C" fn handle_stop(_signal: std::ffi::c_int) {
    // Only an atomic store happens here.
    if let Some(stop) = STOP.get() {
        stop.raise();
    }
}

/// Raise `stop` on SIGINT or SIGTERM, so a sweep stops handing out work and
/// lets running solvers finish.
#[cfg(unix)]
pub fn install_stop_handler(stop: &StopSignal) -> Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    if STOP.set(stop.clone()).is_err() {
        return Err(CliError::ProcessError(
            "stop handler already installed".to_string(),
        ));
    }

    let action = SigAction::new(
        SigHandler::Handler(handle_stop),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: handle_stop is async-signal-safe; it performs one atomic load
        // and one atomic store.
        unsafe { sigaction(signal, &action) }.map_err(|e| {
            CliError::ProcessError(format!("failed to install {signal:?} handler: {e}"))
        })?;
    }
    log::debug!("installed SIGINT/SIGTERM stop handler");
    Ok(())
}

#[cfg(not(unix))]
pub fn install_stop_handler(stop: &StopSignal) -> Result<()> {
    if STOP.set(stop.clone()).is_err() {
        return Err(CliError::ProcessError(
            "stop handler already installed".to_string(),
        ));
    }
    log::debug!("signal-driven stop is only supported on unix");
    Ok(())
}

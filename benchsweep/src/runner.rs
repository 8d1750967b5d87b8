use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

#[cfg(unix)]
use nix::sys::signal::{Signal, kill, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
#[cfg(unix)]
use std::os::unix::process::CommandExt;

use crate::{
    error::{ConfigError, Result},
    sweep::WorkItem,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a single solver invocation produced, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    /// Clean exit with output; a single line unless the solver misbehaved.
    Completed(String),
    TimedOut,
    ProcessFailed(String),
}

/// Runs one work item to completion. Implementations are shared between the
/// executor's worker threads.
pub trait Runner: Sync {
    fn run(&self, item: &WorkItem) -> RawOutcome;
}

/// Runs `<executable> <item argument>` as a child process with a deadline.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
    timeout: Duration,
    kill_grace: Duration,
}

enum Exit {
    Exited(ExitStatus),
    TimedOut,
    PollFailed(String),
}

impl ProcessRunner {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Time between SIGTERM and SIGKILL when a solver overruns its deadline.
    #[must_use]
    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn wait_with_deadline(&self, child: &mut Child, deadline: Instant) -> Exit {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Exit::Exited(status),
                Ok(None) => {}
                Err(e) => {
                    kill_process_tree(child, self.kill_grace);
                    return Exit::PollFailed(format!("failed to poll solver status: {e}"));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                kill_process_tree(child, self.kill_grace);
                return Exit::TimedOut;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl Runner for ProcessRunner {
    fn run(&self, item: &WorkItem) -> RawOutcome {
        let mut command = Command::new(&self.executable);
        command
            .arg(item.arg())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        // Own process group: a terminal Ctrl-C reaches the harness only, and a
        // timeout can take down the solver together with its children.
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RawOutcome::ProcessFailed(format!(
                    "failed to start {}: {e}",
                    self.executable.display()
                ));
            }
        };
        log::debug!("spawned pid {} for {}", child.id(), item.id());

        let (tx, rx) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = tx.send(stdout.read_to_end(&mut buf).map(|_| buf));
            });
        }

        let status = match self.wait_with_deadline(&mut child, started + self.timeout) {
            Exit::Exited(status) => status,
            Exit::TimedOut => return RawOutcome::TimedOut,
            Exit::PollFailed(detail) => return RawOutcome::ProcessFailed(detail),
        };
        log::debug!("{} exited after {:?}", item.id(), started.elapsed());

        if !status.success() {
            return RawOutcome::ProcessFailed(format!("solver exited with {status}"));
        }

        // A descendant that inherited stdout can keep the pipe open after the
        // solver itself exited. Killing what is left of the group closes it.
        let read = match rx.recv_timeout(self.kill_grace) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{}: stdout still open after solver exit, killing leftover processes",
                    item.id()
                );
                kill_leftover_group(child.id());
                rx.recv_timeout(self.kill_grace)
            }
            other => other,
        };
        let output = match read {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return RawOutcome::ProcessFailed(format!("failed to read stdout: {e}")),
            Err(RecvTimeoutError::Timeout) => {
                return RawOutcome::ProcessFailed(
                    "stdout still open after solver exit".to_string(),
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                return RawOutcome::ProcessFailed("solver stdout was not captured".to_string());
            }
        };

        classify_output(&String::from_utf8_lossy(&output))
    }
}

fn classify_output(text: &str) -> RawOutcome {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    match (lines.next(), lines.next()) {
        (None, _) => RawOutcome::ProcessFailed("solver produced no output".to_string()),
        (Some(line), None) => RawOutcome::Completed(line.to_string()),
        (Some(_), Some(_)) => RawOutcome::Completed(text.trim().to_string()),
    }
}

/// Locates the solver the same way `Command` will: paths containing a
/// separator are taken as-is, bare names are searched on `PATH`.
pub fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    if executable.components().count() > 1 || executable.is_absolute() {
        return check_executable(executable).map(|()| executable.to_path_buf());
    }

    let candidates = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();
    for dir in candidates {
        let candidate = dir.join(executable);
        if candidate.is_file() && check_executable(&candidate).is_ok() {
            return Ok(candidate);
        }
    }
    Err(ConfigError::ExecutableNotFound(executable.to_path_buf()))
}

fn check_executable(path: &Path) -> Result<()> {
    let metadata =
        std::fs::metadata(path).map_err(|_| ConfigError::ExecutableNotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ConfigError::NotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ConfigError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Terminate a solver and everything in its process group.
///
/// Sends SIGTERM first, polls for up to `grace`, then SIGKILL if needed. The
/// child is always reaped before returning.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child, grace: Duration) {
    let Ok(raw) = i32::try_from(child.id()) else {
        let _ = child.kill();
        let _ = child.wait();
        return;
    };
    // Spawned with process_group(0), so the group id is the child's pid.
    let pgid = Pid::from_raw(raw);

    if killpg(pgid, Signal::SIGTERM).is_err() {
        let _ = kill(pgid, Signal::SIGTERM);
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if child.try_wait().ok().flatten().is_some() {
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }

    if child.try_wait().ok().flatten().is_none() {
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child, _grace: Duration) {
    let _ = child.kill();
    let _ = child.wait();
}

/// SIGKILL whatever still runs in the group of an already reaped solver.
#[cfg(unix)]
fn kill_leftover_group(pid: u32) {
    if let Ok(raw) = i32::try_from(pid) {
        let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_leftover_group(_pid: u32) {}

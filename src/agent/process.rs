//! The agent's supervised subprocess.
//!
//! Owns at most one child at a time, started through `sh -c` so the
//! configured command line may use redirections. Stopping escalates through
//! interrupt, terminate and kill tiers on a fixed schedule and never blocks
//! past the sum of the grace periods plus a short reap window.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// How long to wait for the kernel to reap a killed child.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle phase of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    /// No process was ever started.
    NotStarted,
    /// A process is alive.
    Running,
    /// A graceful stop is in progress.
    Stopping,
    /// The last process has terminated.
    Dead,
}

/// Signal tier used while stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTier {
    /// `SIGINT`.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// `SIGKILL`.
    Kill,
}

impl StopTier {
    fn signal(self) -> Signal {
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

/// Grace periods of the stop escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSchedule {
    /// Wait after `SIGINT` before escalating.
    pub interrupt_grace: Duration,
    /// Wait after `SIGTERM` before killing.
    pub terminate_grace: Duration,
}

impl Default for StopSchedule {
    fn default() -> Self {
        Self {
            interrupt_grace: Duration::from_secs(3),
            terminate_grace: Duration::from_secs(1),
        }
    }
}

/// What a graceful stop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// Tiers issued, in order.
    pub tiers: Vec<StopTier>,
    /// Return code of the stopped process, when it could be reaped.
    pub returncode: Option<i32>,
}

/// One supervised OS subprocess.
#[derive(Debug)]
pub struct SupervisedProcess {
    command: String,
    child: Option<Child>,
    phase: ProcessPhase,
    returncode: Option<i32>,
    starts: u64,
}

impl SupervisedProcess {
    /// Supervise the shell command line `command`; nothing is started yet.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: None,
            phase: ProcessPhase::NotStarted,
            returncode: None,
            starts: 0,
        }
    }

    /// Current lifecycle phase, refreshed by polling the child.
    pub fn phase(&mut self) -> ProcessPhase {
        self.poll_alive();
        self.phase
    }

    /// Number of processes started so far.
    #[must_use]
    pub fn starts(&self) -> u64 {
        self.starts
    }

    /// Start the process unless one is already running.
    ///
    /// Returns `Ok(false)` when a process was already running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the shell cannot be spawned.
    pub fn start(&mut self) -> Result<bool> {
        if self.poll_alive() {
            return Ok(false);
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Process(format!("failed to start '{}': {err}", self.command)))?;

        info!(pid = child.id().unwrap_or(0), command = %self.command, "process started");
        self.child = Some(child);
        self.phase = ProcessPhase::Running;
        self.returncode = None;
        self.starts += 1;
        Ok(true)
    }

    /// Whether the process is alive; records the return code once it exits.
    pub fn poll_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Err(err) => {
                warn!(%err, "failed to poll process status");
                self.child = None;
                self.phase = ProcessPhase::Dead;
                false
            }
        }
    }

    /// Pid of the process while it runs.
    pub fn pid(&mut self) -> Option<u32> {
        if self.poll_alive() {
            self.child.as_ref().and_then(Child::id)
        } else {
            None
        }
    }

    /// Return code of the last process once it has terminated.
    ///
    /// Death by signal is reported as the negated signal number.
    #[must_use]
    pub fn return_code(&self) -> Option<i32> {
        self.returncode
    }

    /// Send `sig` to the running process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if no process is running or the signal
    /// cannot be delivered.
    pub fn signal(&self, sig: Signal) -> Result<()> {
        let pid = self
            .child
            .as_ref()
            .and_then(Child::id)
            .ok_or_else(|| AppError::Process("no running process to signal".into()))?;
        let pid = i32::try_from(pid)
            .map_err(|_| AppError::Process(format!("pid {pid} out of range")))?;
        signal::kill(Pid::from_raw(pid), sig)
            .map_err(|errno| AppError::Process(format!("failed to send {sig}: {errno}")))
    }

    /// Wait up to `timeout` for the process to exit.
    ///
    /// Returns `true` once the process is no longer running.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                self.record_exit(status);
                true
            }
            Ok(Err(err)) => {
                warn!(%err, "failed to wait for process");
                self.child = None;
                self.phase = ProcessPhase::Dead;
                true
            }
            Err(_) => false,
        }
    }

    /// Stop the process: interrupt, wait, terminate, wait, kill.
    ///
    /// Signalling errors (process already gone, permissions) are logged and
    /// swallowed. Stopping a process that is not running is a no-op.
    pub async fn graceful_stop(&mut self, schedule: StopSchedule) -> StopReport {
        let mut tiers = Vec::new();
        if !self.poll_alive() {
            return StopReport {
                tiers,
                returncode: self.returncode,
            };
        }
        self.phase = ProcessPhase::Stopping;

        let graced = [
            (StopTier::Interrupt, schedule.interrupt_grace),
            (StopTier::Terminate, schedule.terminate_grace),
        ];
        for (tier, grace) in graced {
            tiers.push(tier);
            self.send_tier(tier);
            if self.wait_timeout(grace).await {
                info!(?tier, returncode = ?self.returncode, "process stopped");
                return StopReport {
                    tiers,
                    returncode: self.returncode,
                };
            }
            debug!(?tier, ?grace, "process still alive after grace period");
        }

        tiers.push(StopTier::Kill);
        warn!("process ignored interrupt and terminate, killing");
        self.send_tier(StopTier::Kill);
        if !self.wait_timeout(REAP_TIMEOUT).await {
            warn!("killed process was not reaped in time");
            if let Some(mut child) = self.child.take() {
                let _ = child.start_kill();
            }
            self.phase = ProcessPhase::Dead;
        }

        StopReport {
            tiers,
            returncode: self.returncode,
        }
    }

    fn send_tier(&self, tier: StopTier) {
        if let Err(err) = self.signal(tier.signal()) {
            debug!(?tier, %err, "signal not delivered");
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        let code = status.code().or_else(|| status.signal().map(|sig| -sig));
        if self.phase != ProcessPhase::Dead {
            info!(returncode = ?code, "process exited");
        }
        self.returncode = code;
        self.child = None;
        self.phase = ProcessPhase::Dead;
    }
}

//! Commands delivered from the control server to agents.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A command token carried in the server's reply to a status report.
///
/// Every variant is idempotent: delivery is at-least-once, so an agent may
/// observe the same command more than once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// No-op heartbeat value.
    Continue,
    /// Start the supervised process if it is not running.
    Start,
    /// Gracefully stop, then start, the supervised process.
    Restart,
    /// Gracefully stop the supervised process and shut the agent down.
    Exit,
}

impl Command {
    /// Wire token for this command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Start => "start",
            Self::Restart => "restart",
            Self::Exit => "exit",
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative verb sent by operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminCommand {
    /// Restart every worker.
    Restart,
    /// Restart the scheduler, then every worker.
    Reset,
    /// Shut down every worker and the scheduler.
    Exit,
    /// Report an aggregate cluster snapshot.
    Info,
    /// Any verb this server does not recognize.
    #[serde(other)]
    Unknown,
}

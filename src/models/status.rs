//! Agent status reports and resource statistics.

use serde::{Deserialize, Serialize};

/// Role an agent plays in the cluster.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Executes tasks.
    #[default]
    Worker,
    /// Dispatches tasks; at most one is registered at a time.
    Scheduler,
}

/// Liveness of an agent's supervised process.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Process is alive.
    Running,
    /// Process is not running (never started, exited, or killed).
    #[default]
    Dead,
}

/// Resource usage of a process tree averaged over a short window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceStats {
    /// CPU usage in percent of one core.
    pub cpu: f64,
    /// Resident memory in bytes.
    pub mem: f64,
    /// Network throughput in bytes per second.
    pub net: f64,
    /// Disk throughput in bytes per second.
    pub disk_io: f64,
}

/// Periodic status report sent by an agent.
///
/// The role travels as the message `type` discriminator; see
/// [`Inbound`](super::message::Inbound).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    /// Agent identifier, stable for the agent's lifetime.
    pub uid: String,
    /// Host the agent runs on.
    #[serde(default)]
    pub host: String,
    /// Pid of the supervised process while it runs.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Liveness of the supervised process.
    #[serde(default)]
    pub status: ProcessState,
    /// Exit code once the process has terminated.
    #[serde(default)]
    pub returncode: Option<i32>,
    /// CPU usage in percent.
    #[serde(default)]
    pub cpu: f64,
    /// Resident memory in bytes.
    #[serde(default)]
    pub mem: f64,
    /// Network throughput in bytes per second.
    #[serde(default)]
    pub net: f64,
    /// Disk throughput in bytes per second.
    #[serde(default)]
    pub disk_io: f64,
}

impl StatusReport {
    /// A report for an agent whose process is not running.
    #[must_use]
    pub fn dead(uid: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            host: host.into(),
            pid: None,
            status: ProcessState::Dead,
            returncode: None,
            cpu: 0.0,
            mem: 0.0,
            net: 0.0,
            disk_io: 0.0,
        }
    }

    /// Resource figures carried by this report.
    #[must_use]
    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            cpu: self.cpu,
            mem: self.mem,
            net: self.net,
            disk_io: self.disk_io,
        }
    }

    /// Overwrite the resource figures.
    pub fn set_stats(&mut self, stats: ResourceStats) {
        self.cpu = stats.cpu;
        self.mem = stats.mem;
        self.net = stats.net;
        self.disk_io = stats.disk_io;
    }
}

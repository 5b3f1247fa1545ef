//! Server-side record of a registered agent.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::{AgentKind, ProcessState, ResourceStats, StatusReport};

/// Latest known state of one agent, keyed by uid in the registry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentRecord {
    /// Agent identifier.
    pub uid: String,
    /// Worker or scheduler.
    pub kind: AgentKind,
    /// Host the agent runs on.
    pub host: String,
    /// Pid of the supervised process while it runs.
    pub pid: Option<u32>,
    /// Liveness of the supervised process.
    pub status: ProcessState,
    /// Exit code once the process has terminated.
    pub returncode: Option<i32>,
    /// Latest resource usage.
    #[serde(flatten)]
    pub stats: ResourceStats,
    /// Wall-clock time of the last handled status report.
    pub last_seen: DateTime<Utc>,
    /// Monotonic time of the last handled status report.
    #[serde(skip)]
    pub last_contact: Instant,
}

impl AgentRecord {
    /// Build a record from a report received at `now`.
    #[must_use]
    pub fn from_report(kind: AgentKind, report: StatusReport, now: Instant) -> Self {
        let stats = report.stats();
        Self {
            uid: report.uid,
            kind,
            host: report.host,
            pid: report.pid,
            status: report.status,
            returncode: report.returncode,
            stats,
            last_seen: Utc::now(),
            last_contact: now,
        }
    }

    /// Time since the last contact, saturating at zero.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_contact)
    }

    /// Whether this record has been silent for longer than `timeout`.
    #[must_use]
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.idle_for(now) > timeout
    }
}

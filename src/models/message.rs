//! Wire envelopes exchanged on the control channels.
//!
//! ## Requests
//!
//! ```json
//! {"type": "worker", "uid": "…", "host": "node1", "pid": 4242, "status": "running",
//!  "returncode": null, "cpu": 12.5, "mem": 1048576.0, "net": 0.0, "disk_io": 0.0}
//! {"type": "command", "cmd": "restart"}
//! ```
//!
//! ## Replies
//!
//! ```json
//! ["restart"]
//! {"status": "ok"}
//! {"status": "failed", "reason": "Unknown command"}
//! {"status": "fail"}
//! ```
//!
//! An `info` reply carries `"scheduler": {}` while no scheduler is
//! registered.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::command::{AdminCommand, Command};
use super::record::AgentRecord;
use super::status::{AgentKind, StatusReport};
use super::workload::WorkloadSnapshot;

/// Placeholder reported as `shost` when no scheduler is registered.
pub const NOT_AVAILABLE: &str = "N/A";

/// Encoded [`StatusReply::fail`], sent when a reply cannot be serialized.
pub const FAIL_REPLY: &str = r#"{"status":"fail"}"#;

/// Inbound message, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Status report from a worker agent.
    Worker(StatusReport),
    /// Status report from a scheduler agent.
    Scheduler(StatusReport),
    /// Administrative request.
    Command(AdminRequest),
}

impl Inbound {
    /// Wrap a status report under the discriminator for `kind`.
    #[must_use]
    pub fn status(kind: AgentKind, report: StatusReport) -> Self {
        match kind {
            AgentKind::Worker => Self::Worker(report),
            AgentKind::Scheduler => Self::Scheduler(report),
        }
    }
}

/// Body of a `{"type": "command"}` message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminRequest {
    /// Requested verb.
    pub cmd: AdminCommand,
}

/// Outcome marker of an admin reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Request accepted.
    Ok,
    /// Request could not be carried out.
    Fail,
    /// Request was not understood.
    Failed,
}

/// Reply to `restart`, `reset`, `exit`, or an unrecognized message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReply {
    /// Outcome marker.
    pub status: ReplyStatus,
    /// Failure explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StatusReply {
    /// Successful acknowledgement.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: ReplyStatus::Ok,
            reason: None,
        }
    }

    /// Request that could not be carried out.
    #[must_use]
    pub fn fail() -> Self {
        Self {
            status: ReplyStatus::Fail,
            reason: None,
        }
    }

    /// Reply to a message the server does not understand.
    #[must_use]
    pub fn unknown_command() -> Self {
        Self {
            status: ReplyStatus::Failed,
            reason: Some("Unknown command".into()),
        }
    }
}

/// Mean resource usage across registered workers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerAggregate {
    /// Mean CPU percent.
    pub ave_cpu: f64,
    /// Mean resident memory in bytes.
    pub ave_mem: f64,
    /// Mean network throughput.
    pub ave_net: f64,
    /// Mean disk throughput.
    pub ave_disk_io: f64,
}

/// Reply to `info`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InfoReply {
    /// Always `ok`; outages show up as zero or `N/A` fields.
    pub status: ReplyStatus,
    /// Host the control server runs on.
    pub host: String,
    /// Host of the registered scheduler, or `N/A`.
    pub shost: String,
    /// Number of registered workers.
    pub n_workers: usize,
    /// Mean CPU percent across workers, 0 when there are none.
    pub ave_cpu: f64,
    /// Latest scheduler record; an empty object when none is registered.
    #[serde(serialize_with = "record_or_empty")]
    pub scheduler: Option<AgentRecord>,
    /// Resource means across workers.
    pub workers: WorkerAggregate,
    /// Latest workload sampler snapshot.
    pub workload: WorkloadSnapshot,
}

/// Any reply the server sends back on a control channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Reply {
    /// Pending commands for a reporting agent, in delivery order.
    Commands(Vec<Command>),
    /// Admin acknowledgement or failure.
    Status(StatusReply),
    /// Admin `info` snapshot.
    Info(Box<InfoReply>),
}

#[allow(clippy::ref_option)]
fn record_or_empty<S: Serializer>(
    record: &Option<AgentRecord>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match record {
        Some(record) => record.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

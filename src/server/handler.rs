//! Message dispatch for the control server.
//!
//! Parses one request line, routes it on its `type` discriminator, and
//! produces the reply plus an optional queue commit. Parse failures and
//! unknown verbs become an explicit failure reply; nothing here returns an
//! error to the event loop.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::models::command::{AdminCommand, Command};
use crate::models::message::{
    InfoReply, Inbound, Reply, ReplyStatus, StatusReply, WorkerAggregate, NOT_AVAILABLE,
};
use crate::models::workload::WorkloadSnapshot;
use crate::protocol;
use crate::server::registry::{QueueCommit, Registry};

/// Reply to send back plus the commit to apply once it is confirmed sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    /// Reply payload.
    pub reply: Reply,
    /// Queue drain to apply after a confirmed send.
    pub commit: Option<QueueCommit>,
}

impl Handled {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            commit: None,
        }
    }
}

/// Read-only inputs to `info` handling.
#[derive(Debug, Clone)]
pub struct InfoSources<'a> {
    /// Host the control server runs on.
    pub host: &'a str,
    /// Latest workload sampler snapshot.
    pub workload: WorkloadSnapshot,
}

/// Parse and handle one raw request line.
pub fn handle_line(
    registry: &mut Registry,
    line: &str,
    info: &InfoSources<'_>,
    now: Instant,
) -> Handled {
    match protocol::decode::<Inbound>(line) {
        Ok(message) => handle_message(registry, message, info, now),
        Err(err) => {
            warn!(%err, "unrecognized message");
            Handled::reply(Reply::Status(StatusReply::unknown_command()))
        }
    }
}

/// Route a parsed message to the registry or the admin handlers.
pub fn handle_message(
    registry: &mut Registry,
    message: Inbound,
    info: &InfoSources<'_>,
    now: Instant,
) -> Handled {
    match message {
        Inbound::Worker(report) => {
            debug!(uid = %report.uid, "worker status");
            let exchange = registry.handle_worker_status(report, now);
            Handled {
                reply: Reply::Commands(exchange.commands),
                commit: Some(exchange.commit),
            }
        }
        Inbound::Scheduler(report) => {
            debug!(uid = %report.uid, "scheduler status");
            let exchange = registry.handle_scheduler_status(report, now);
            Handled {
                reply: Reply::Commands(exchange.commands),
                commit: Some(exchange.commit),
            }
        }
        Inbound::Command(request) => Handled::reply(handle_admin_command(registry, request.cmd, info)),
    }
}

/// Apply an admin verb to the registry.
pub fn handle_admin_command(
    registry: &mut Registry,
    cmd: AdminCommand,
    info: &InfoSources<'_>,
) -> Reply {
    info!(?cmd, "admin command received");
    match cmd {
        AdminCommand::Restart => {
            let workers = registry.enqueue_workers(Command::Restart);
            info!(workers, "restart queued");
            Reply::Status(StatusReply::ok())
        }
        AdminCommand::Reset => {
            // Scheduler first so workers reconnect to a fresh scheduler.
            let schedulers = registry.enqueue_scheduler(Command::Restart);
            let workers = registry.enqueue_workers(Command::Restart);
            info!(schedulers, workers, "reset queued");
            Reply::Status(StatusReply::ok())
        }
        AdminCommand::Exit => {
            let workers = registry.enqueue_workers(Command::Exit);
            let schedulers = registry.enqueue_scheduler(Command::Exit);
            info!(schedulers, workers, "exit queued");
            Reply::Status(StatusReply::ok())
        }
        AdminCommand::Info => Reply::Info(Box::new(build_info(registry, info))),
        AdminCommand::Unknown => Reply::Status(StatusReply::unknown_command()),
    }
}

/// Aggregate snapshot for `info`.
#[must_use]
pub fn build_info(registry: &Registry, sources: &InfoSources<'_>) -> InfoReply {
    let workers = aggregate_workers(registry);
    let shost = registry
        .scheduler()
        .map(|s| s.host.clone())
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_owned());

    InfoReply {
        status: ReplyStatus::Ok,
        host: sources.host.to_owned(),
        shost,
        n_workers: registry.worker_count(),
        ave_cpu: workers.ave_cpu,
        scheduler: registry.scheduler().cloned(),
        workers,
        workload: sources.workload.clone(),
    }
}

fn aggregate_workers(registry: &Registry) -> WorkerAggregate {
    let n = registry.worker_count();
    if n == 0 {
        return WorkerAggregate::default();
    }
    let mut total = WorkerAggregate::default();
    for record in registry.workers() {
        total.ave_cpu += record.stats.cpu;
        total.ave_mem += record.stats.mem;
        total.ave_net += record.stats.net;
        total.ave_disk_io += record.stats.disk_io;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    WorkerAggregate {
        ave_cpu: total.ave_cpu / n,
        ave_mem: total.ave_mem / n,
        ave_net: total.ave_net / n,
        ave_disk_io: total.ave_disk_io / n,
    }
}

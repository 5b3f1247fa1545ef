//! Agent registry and per-agent command queues.
//!
//! The registry is owned by the server event loop and is never shared, so it
//! needs no locking. Every queue is drained only through a [`QueueCommit`]
//! that the event loop applies after the reply carrying those commands was
//! confirmed written.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::info;

use crate::models::command::Command;
use crate::models::record::AgentRecord;
use crate::models::status::{AgentKind, StatusReport};

/// Proof that `delivered` commands were handed to `uid` in a reply.
///
/// Applying it with [`Registry::commit`] removes exactly those commands
/// from the front of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "dropping a commit leaves the commands queued for redelivery"]
pub struct QueueCommit {
    uid: String,
    delivered: usize,
}

impl QueueCommit {
    /// Agent the commit applies to.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Number of commands carried by the reply.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

/// Result of handling one status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusExchange {
    /// Pending commands for the reporter, oldest first.
    pub commands: Vec<Command>,
    /// Clears `commands` from the queue once the reply is confirmed sent.
    pub commit: QueueCommit,
}

/// Server-side store of agent records and their pending commands.
#[derive(Debug, Default)]
pub struct Registry {
    workers: HashMap<String, AgentRecord>,
    scheduler: Option<AgentRecord>,
    queues: HashMap<String, VecDeque<Command>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a worker record and return its pending commands.
    pub fn handle_worker_status(&mut self, report: StatusReport, now: Instant) -> StatusExchange {
        let uid = report.uid.clone();
        if !self.workers.contains_key(&uid) {
            info!(uid = %uid, host = %report.host, "new worker connection");
        }
        self.workers.insert(
            uid.clone(),
            AgentRecord::from_report(AgentKind::Worker, report, now),
        );
        self.pending_exchange(uid)
    }

    /// Replace the scheduler record and return its pending commands.
    ///
    /// A different uid evicts the previous scheduler together with its queue.
    pub fn handle_scheduler_status(
        &mut self,
        report: StatusReport,
        now: Instant,
    ) -> StatusExchange {
        let uid = report.uid.clone();
        if let Some(previous) = self.scheduler.as_ref().filter(|s| s.uid != uid) {
            info!(
                previous = %previous.uid,
                uid = %uid,
                "scheduler replaced"
            );
            self.queues.remove(&previous.uid);
        } else if self.scheduler.is_none() {
            info!(uid = %uid, host = %report.host, "new scheduler connection");
        }
        self.scheduler = Some(AgentRecord::from_report(AgentKind::Scheduler, report, now));
        self.pending_exchange(uid)
    }

    fn pending_exchange(&mut self, uid: String) -> StatusExchange {
        let queue = self.queues.entry(uid.clone()).or_default();
        let commands: Vec<Command> = queue.iter().copied().collect();
        StatusExchange {
            commit: QueueCommit {
                uid,
                delivered: commands.len(),
            },
            commands,
        }
    }

    /// Remove the commands acknowledged by `commit` from the front of the
    /// queue. A queue that was culled meanwhile is left alone.
    pub fn commit(&mut self, commit: QueueCommit) {
        if let Some(queue) = self.queues.get_mut(&commit.uid) {
            let n = commit.delivered.min(queue.len());
            queue.drain(..n);
        }
    }

    /// Append `command` to the queue of `uid`.
    pub fn enqueue(&mut self, uid: &str, command: Command) {
        self.queues
            .entry(uid.to_owned())
            .or_default()
            .push_back(command);
    }

    /// Append `command` to every registered worker's queue.
    pub fn enqueue_workers(&mut self, command: Command) -> usize {
        let uids: Vec<String> = self.workers.keys().cloned().collect();
        for uid in &uids {
            self.enqueue(uid, command);
        }
        uids.len()
    }

    /// Append `command` to the registered scheduler's queue, if any.
    pub fn enqueue_scheduler(&mut self, command: Command) -> usize {
        let Some(uid) = self.scheduler.as_ref().map(|s| s.uid.clone()) else {
            return 0;
        };
        self.enqueue(&uid, command);
        1
    }

    /// Drop every record silent for longer than `timeout`, with its queue.
    ///
    /// Returns the culled uids.
    pub fn cull_inactive(&mut self, timeout: Duration, now: Instant) -> Vec<String> {
        let mut culled: Vec<String> = self
            .workers
            .values()
            .filter(|record| record.is_stale(now, timeout))
            .map(|record| record.uid.clone())
            .collect();
        for uid in &culled {
            info!(uid = %uid, "culling inactive worker");
            self.workers.remove(uid);
            self.queues.remove(uid);
        }

        if let Some(uid) = self
            .scheduler
            .as_ref()
            .filter(|record| record.is_stale(now, timeout))
            .map(|record| record.uid.clone())
        {
            info!(uid = %uid, "culling inactive scheduler");
            self.scheduler = None;
            self.queues.remove(&uid);
            culled.push(uid);
        }

        culled
    }

    /// Registered workers, in no particular order.
    pub fn workers(&self) -> impl Iterator<Item = &AgentRecord> {
        self.workers.values()
    }

    /// Number of registered workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// The registered scheduler, if any.
    #[must_use]
    pub fn scheduler(&self) -> Option<&AgentRecord> {
        self.scheduler.as_ref()
    }

    /// Look up a worker or the scheduler by uid.
    #[must_use]
    pub fn record(&self, uid: &str) -> Option<&AgentRecord> {
        self.workers
            .get(uid)
            .or_else(|| self.scheduler.as_ref().filter(|s| s.uid == uid))
    }

    /// Pending commands for `uid`, or `None` if it has no queue.
    #[must_use]
    pub fn pending(&self, uid: &str) -> Option<Vec<Command>> {
        self.queues
            .get(uid)
            .map(|queue| queue.iter().copied().collect())
    }
}

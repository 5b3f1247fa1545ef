//! Agent communication loop.
//!
//! Reports status to the server every cycle and feeds the commands it gets
//! back into the local queue. Transport failures only cost a cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::client::AgentClient;
use crate::agent::context::{LocalCommand, SharedControlContext};
use crate::models::message::Inbound;
use crate::models::status::{AgentKind, ProcessState, StatusReport};
use crate::providers::ProcessStatsProvider;

/// Identity an agent reports under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    /// Identifier, stable for the agent's lifetime.
    pub uid: String,
    /// Role.
    pub kind: AgentKind,
    /// Hostname.
    pub host: String,
}

/// Periodic status exchange with the server.
pub struct CommunicationLoop {
    identity: AgentIdentity,
    client: AgentClient,
    ctx: Arc<SharedControlContext>,
    stats: Arc<dyn ProcessStatsProvider>,
    update_cycle: Duration,
}

impl CommunicationLoop {
    /// Build a loop; nothing is sent until [`run`](Self::run).
    #[must_use]
    pub fn new(
        identity: AgentIdentity,
        client: AgentClient,
        ctx: Arc<SharedControlContext>,
        stats: Arc<dyn ProcessStatsProvider>,
        update_cycle: Duration,
    ) -> Self {
        Self {
            identity,
            client,
            ctx,
            stats,
            update_cycle,
        }
    }

    /// Run until `interrupt` fires or the control loop stops.
    ///
    /// An interrupt pushes [`LocalCommand::Stop`] so the control loop wakes
    /// up and shuts the process down.
    pub async fn run(mut self, interrupt: CancellationToken) {
        let mut ticker = tokio::time::interval(self.update_cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = interrupt.cancelled() => {
                    info!("interrupted, asking control loop to stop");
                    self.ctx.push(LocalCommand::Stop);
                    break;
                }
                () = self.ctx.stopped() => {
                    debug!("control loop stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if !self.ctx.is_running() {
                break;
            }
            self.cycle().await;
        }
    }

    async fn cycle(&mut self) {
        let report = self.gather().await;
        let message = Inbound::status(self.identity.kind, report);
        match self.client.exchange(&message).await {
            Ok(commands) => {
                if !commands.is_empty() {
                    info!(?commands, "received commands");
                }
                for command in commands {
                    self.ctx.push(LocalCommand::Apply(command));
                }
            }
            Err(err) => warn!(%err, "status exchange failed, retrying next cycle"),
        }
    }

    /// Current status of this agent.
    async fn gather(&self) -> StatusReport {
        let mut report = StatusReport::dead(&self.identity.uid, &self.identity.host);
        report.returncode = self.ctx.return_code();
        if let Some(pid) = self.ctx.pid() {
            report.pid = Some(pid);
            report.status = ProcessState::Running;
            match self.stats.sample(pid).await {
                Some(stats) => report.set_stats(stats),
                None => debug!(pid, "process vanished while sampling"),
            }
        }
        report
    }
}

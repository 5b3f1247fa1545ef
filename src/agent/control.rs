//! Agent control loop.
//!
//! The only owner of the supervised process. Applies commands from the
//! local queue in FIFO order, restarts a dead process when auto-restart is
//! on, and publishes pid and return code back into the shared context.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::agent::context::{LocalCommand, LocalQueue, QueueWait, SharedControlContext};
use crate::agent::process::{StopSchedule, SupervisedProcess};
use crate::models::command::Command;

/// Applies queued commands to the supervised process.
#[derive(Debug)]
pub struct ControlLoop {
    process: SupervisedProcess,
    ctx: Arc<SharedControlContext>,
    queue: LocalQueue,
    schedule: StopSchedule,
    queue_wait: Duration,
}

impl ControlLoop {
    /// Build a loop around `process`; nothing runs until [`run`](Self::run).
    #[must_use]
    pub fn new(
        process: SupervisedProcess,
        ctx: Arc<SharedControlContext>,
        queue: LocalQueue,
        schedule: StopSchedule,
        queue_wait: Duration,
    ) -> Self {
        Self {
            process,
            ctx,
            queue,
            schedule,
            queue_wait,
        }
    }

    /// Run until `exit`, an operator stop, or the queue closes.
    ///
    /// Returns the supervised process, which is no longer running.
    pub async fn run(mut self) -> SupervisedProcess {
        self.ensure_started();
        self.publish();

        loop {
            let wait = self.queue.next(self.queue_wait).await;
            let flow = match wait {
                QueueWait::Received(command) => self.apply(command).await,
                QueueWait::Idle => ControlFlow::Continue(()),
                QueueWait::Closed => {
                    debug!("local queue closed");
                    self.shutdown().await;
                    ControlFlow::Break(())
                }
            };
            if flow.is_break() {
                break;
            }

            if self.ctx.auto_restart() && !self.process.poll_alive() {
                info!(returncode = ?self.process.return_code(), "process is dead, restarting");
                self.ensure_started();
            }
            self.publish();
        }

        self.process
    }

    async fn apply(&mut self, command: LocalCommand) -> ControlFlow<()> {
        debug!(?command, "applying command");
        match command {
            LocalCommand::Apply(Command::Continue) => {}
            LocalCommand::Apply(Command::Start) => self.ensure_started(),
            LocalCommand::Apply(Command::Restart) => {
                self.process.graceful_stop(self.schedule).await;
                self.ensure_started();
            }
            LocalCommand::Apply(Command::Exit) | LocalCommand::Stop => {
                self.shutdown().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn ensure_started(&mut self) {
        if let Err(err) = self.process.start() {
            error!(%err, "failed to start process");
        }
    }

    async fn shutdown(&mut self) {
        let report = self.process.graceful_stop(self.schedule).await;
        if !report.tiers.is_empty() {
            info!(tiers = ?report.tiers, returncode = ?report.returncode, "process stopped for exit");
        }
        let discarded = self.queue.clear();
        if discarded > 0 {
            warn!(discarded, "dropping commands queued behind exit");
        }
        self.queue.close();
        self.publish();
        self.ctx.stop_running();
    }

    fn publish(&mut self) {
        self.ctx.set_pid(self.process.pid());
        self.ctx.set_return_code(self.process.return_code());
    }
}

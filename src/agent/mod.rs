//! Worker and scheduler agent.
//!
//! Two concurrent loops share a [`SharedControlContext`](context::SharedControlContext):
//! the control loop owns the supervised process and the communication loop
//! talks to the server. Commands flow from the latter to the former over the
//! context's local queue.

pub mod client;
pub mod comm;
pub mod context;
pub mod control;
pub mod process;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::agent::client::{AgentClient, ClientTimings};
use crate::agent::comm::{AgentIdentity, CommunicationLoop};
use crate::agent::context::SharedControlContext;
use crate::agent::control::ControlLoop;
use crate::agent::process::{StopSchedule, SupervisedProcess};
use crate::config::AgentConfig;
use crate::host;
use crate::providers::ProcessStatsProvider;
use crate::{AppError, Result};

/// Run an agent until `exit` is received or `interrupt` fires.
///
/// # Errors
///
/// Returns `AppError::Io` if one of the agent loops panicked.
pub async fn run_agent(
    config: &AgentConfig,
    stats: Arc<dyn ProcessStatsProvider>,
    interrupt: CancellationToken,
) -> Result<()> {
    let identity = AgentIdentity {
        uid: uuid::Uuid::new_v4().to_string(),
        kind: config.kind,
        host: host::local_hostname(),
    };
    info!(uid = %identity.uid, kind = ?identity.kind, host = %identity.host, "agent starting");

    let (ctx, queue) = SharedControlContext::new(config.auto_restart);
    let schedule = StopSchedule {
        interrupt_grace: config.interrupt_grace(),
        terminate_grace: config.terminate_grace(),
    };
    let control = ControlLoop::new(
        SupervisedProcess::new(config.command.clone()),
        Arc::clone(&ctx),
        queue,
        schedule,
        config.queue_wait(),
    );
    let client = AgentClient::new(
        config.server_addr.clone(),
        ClientTimings {
            send_timeout: config.send_timeout(),
            recv_timeout: config.recv_timeout(),
            recv_attempts: config.recv_attempts,
        },
    );
    let comm = CommunicationLoop::new(
        identity.clone(),
        client,
        Arc::clone(&ctx),
        stats,
        config.update_cycle(),
    );

    let span = info_span!("agent", uid = %identity.uid);
    let control_task =
        tokio::spawn(control.run().instrument(info_span!(parent: &span, "control_loop")));
    let comm_task =
        tokio::spawn(comm.run(interrupt).instrument(info_span!(parent: &span, "comm_loop")));

    let process = control_task
        .await
        .map_err(|err| AppError::Io(format!("control loop failed: {err}")))?;
    comm_task
        .await
        .map_err(|err| AppError::Io(format!("communication loop failed: {err}")))?;

    info!(uid = %identity.uid, returncode = ?process.return_code(), "agent stopped");
    Ok(())
}

//! Control server: registry, event loop, listeners, and workload sampler.

pub mod event_loop;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod sampler;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::models::workload::WorkloadSnapshot;
use crate::providers::WorkloadStatusProvider;
use crate::server::event_loop::{Channel, EventLoop, LoopTimings};
use crate::server::registry::Registry;
use crate::{AppError, Result};

/// Capacity of the listener → event loop queue.
const INBOX_CAPACITY: usize = 256;

/// Running control server.
#[derive(Debug)]
pub struct ServerHandle {
    /// Bound address of the agent channel.
    pub agent_addr: SocketAddr,
    /// Bound address of the network admin channel.
    pub admin_addr: SocketAddr,
    event_loop: JoinHandle<Registry>,
    background: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ServerHandle {
    /// Ask every server task to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every server task and return the final registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the event loop task panicked.
    pub async fn join(self) -> Result<Registry> {
        let registry = self
            .event_loop
            .await
            .map_err(|err| AppError::Io(format!("server loop task failed: {err}")))?;
        for task in self.background {
            if let Err(err) = task.await {
                warn!(%err, "server task failed");
            }
        }
        info!("bye");
        Ok(registry)
    }
}

/// Bind every endpoint and start the server tasks.
///
/// `cancel` stops the server; cancelling it is equivalent to
/// [`ServerHandle::shutdown`].
///
/// # Errors
///
/// Returns `AppError::Transport` or `AppError::Ipc` if an endpoint cannot
/// be bound.
pub async fn start(
    config: &ServerConfig,
    host: String,
    workload_provider: Arc<dyn WorkloadStatusProvider>,
    cancel: CancellationToken,
) -> Result<ServerHandle> {
    let agent_listener = listener::bind_tcp(&config.agent_addr).await?;
    let admin_listener = listener::bind_tcp(&config.admin_addr).await?;
    let agent_addr = agent_listener.local_addr()?;
    let admin_addr = admin_listener.local_addr()?;

    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
    let (slot_tx, slot_rx) = watch::channel(WorkloadSnapshot::default());

    let mut background = vec![
        sampler::spawn_workload_sampler(
            workload_provider,
            config.sampler_interval(),
            slot_tx,
            cancel.clone(),
        ),
        listener::spawn_tcp_listener(
            agent_listener,
            Channel::Agent,
            inbox_tx.clone(),
            config.reply_timeout(),
            cancel.clone(),
        ),
        listener::spawn_tcp_listener(
            admin_listener,
            Channel::AdminTcp,
            inbox_tx.clone(),
            config.reply_timeout(),
            cancel.clone(),
        ),
    ];
    if let Some(ref name) = config.admin_ipc_name {
        match listener::spawn_ipc_listener(
            name,
            inbox_tx.clone(),
            config.reply_timeout(),
            cancel.clone(),
        ) {
            Ok(task) => background.push(task),
            Err(err) => {
                cancel.cancel();
                return Err(err);
            }
        }
    }
    drop(inbox_tx);

    info!(%agent_addr, %admin_addr, "control server listening");

    let timings = LoopTimings {
        poll_interval: config.poll_interval(),
        reply_timeout: config.reply_timeout(),
        cull_timeout: config.cull_timeout(),
    };
    let event_loop = tokio::spawn(
        EventLoop::new(host, slot_rx, timings)
            .run(inbox_rx, cancel.clone())
            .instrument(info_span!("event_loop")),
    );

    Ok(ServerHandle {
        agent_addr,
        admin_addr,
        event_loop,
        background,
        cancel,
    })
}

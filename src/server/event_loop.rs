//! Single-writer event loop owning the registry.
//!
//! Connection tasks forward each request line as an [`Exchange`] and wait
//! for an [`Outgoing`] reply. Once the reply is written they report back
//! through the `delivered` channel. The loop applies the queue commit only
//! when that report arrives within the reply window; otherwise the commands
//! stay queued and are redelivered on the next poll.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::message::FAIL_REPLY;
use crate::models::workload::WorkloadSnapshot;
use crate::protocol;
use crate::server::handler::{self, InfoSources};
use crate::server::registry::Registry;

/// Endpoint a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Agent status exchanges.
    Agent,
    /// Network-reachable admin commands.
    AdminTcp,
    /// Local-only admin commands.
    AdminLocal,
}

/// One request awaiting a reply.
#[derive(Debug)]
pub struct Exchange {
    /// Endpoint the request arrived on.
    pub channel: Channel,
    /// Raw request line.
    pub request: String,
    /// Where to hand the reply.
    pub reply: oneshot::Sender<Outgoing>,
}

/// Reply handed to a connection task for writing.
#[derive(Debug)]
pub struct Outgoing {
    /// Serialized reply line.
    pub payload: String,
    /// Signalled by the connection task after the write completed.
    pub delivered: oneshot::Sender<()>,
}

/// Timing knobs of the event loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopTimings {
    /// Upper bound on waiting for traffic before culling.
    pub poll_interval: Duration,
    /// Window for a reply write to be confirmed.
    pub reply_timeout: Duration,
    /// Inactivity threshold for culling.
    pub cull_timeout: Duration,
}

/// The server's registry owner.
#[derive(Debug)]
pub struct EventLoop {
    registry: Registry,
    host: String,
    workload: watch::Receiver<WorkloadSnapshot>,
    timings: LoopTimings,
}

impl EventLoop {
    /// Create an event loop over an empty registry.
    #[must_use]
    pub fn new(
        host: String,
        workload: watch::Receiver<WorkloadSnapshot>,
        timings: LoopTimings,
    ) -> Self {
        Self {
            registry: Registry::new(),
            host,
            workload,
            timings,
        }
    }

    /// Serve exchanges until `cancel` fires or every sender is dropped.
    ///
    /// Returns the registry so callers can inspect the final state.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Exchange>,
        cancel: CancellationToken,
    ) -> Registry {
        info!("starting server loop");
        let mut ticker = tokio::time::interval(self.timings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("interrupt received, stopping server loop");
                    break;
                }
                next = inbox.recv() => {
                    let Some(exchange) = next else {
                        info!("all listeners closed, stopping server loop");
                        break;
                    };
                    self.serve(exchange).await;
                }
                _ = ticker.tick() => {}
            }

            self.registry
                .cull_inactive(self.timings.cull_timeout, Instant::now());
        }

        self.registry
    }

    async fn serve(&mut self, exchange: Exchange) {
        let sources = InfoSources {
            host: &self.host,
            workload: self.workload.borrow().clone(),
        };
        let handled = handler::handle_line(
            &mut self.registry,
            &exchange.request,
            &sources,
            Instant::now(),
        );

        let payload = match protocol::encode(&handled.reply) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to serialize reply");
                FAIL_REPLY.to_owned()
            }
        };

        let (delivered_tx, delivered_rx) = oneshot::channel();
        let outgoing = Outgoing {
            payload,
            delivered: delivered_tx,
        };
        if exchange.reply.send(outgoing).is_err() {
            debug!(channel = ?exchange.channel, "connection closed before reply");
            return;
        }

        match tokio::time::timeout(self.timings.reply_timeout, delivered_rx).await {
            Ok(Ok(())) => {
                if let Some(commit) = handled.commit {
                    self.registry.commit(commit);
                }
            }
            Ok(Err(_)) | Err(_) => {
                warn!(
                    channel = ?exchange.channel,
                    "cannot confirm reply was sent, leaving queue intact"
                );
            }
        }
    }
}

//! Listeners for the three control channels.
//!
//! Agents and network admin clients connect over TCP; local admin clients
//! use a named local socket (abstract Unix socket on Linux, named pipe on
//! Windows) via the `interprocess` crate. Every connection is a strict
//! request-reply session: one JSON line in, one JSON line out.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::protocol::codec::ControlCodec;
use crate::server::event_loop::{Channel, Exchange};
use crate::{AppError, Result};

/// Bind a TCP listener for one of the network channels.
///
/// # Errors
///
/// Returns `AppError::Transport` if the address cannot be bound.
pub async fn bind_tcp(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Transport(format!("failed to bind {addr}: {err}")))
}

/// Spawn the accept loop for a bound TCP listener.
#[must_use]
pub fn spawn_tcp_listener(
    listener: TcpListener,
    channel: Channel,
    inbox: mpsc::Sender<Exchange>,
    reply_timeout: Duration,
    ct: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("tcp_listener", ?channel);
    tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("listener shutting down");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "connection accepted");
                            let (reader, writer) = stream.into_split();
                            tokio::spawn(serve_connection(
                                reader,
                                writer,
                                channel,
                                inbox.clone(),
                                reply_timeout,
                                ct.clone(),
                            ));
                        }
                        Err(err) => warn!(%err, "accept failed"),
                    }
                }
            }
        }
        .instrument(span),
    )
}

/// Create the local-only admin listener and spawn its accept loop.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the socket name is invalid or the listener
/// cannot be created.
pub fn spawn_ipc_listener(
    name: &str,
    inbox: mpsc::Sender<Exchange>,
    reply_timeout: Duration,
    ct: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener_name = name
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "local admin socket listening");

    let span = info_span!("ipc_listener", name = %name);
    Ok(tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("local admin socket shutting down");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok(stream) => {
                            let (reader, writer) = stream.split();
                            tokio::spawn(serve_connection(
                                reader,
                                writer,
                                Channel::AdminLocal,
                                inbox.clone(),
                                reply_timeout,
                                ct.clone(),
                            ));
                        }
                        Err(err) => warn!(%err, "ipc accept failed"),
                    }
                }
            }
        }
        .instrument(span),
    ))
}

/// Run one request-reply session until the peer disconnects.
async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    channel: Channel,
    inbox: mpsc::Sender<Exchange>,
    reply_timeout: Duration,
    ct: CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(reader, ControlCodec::new());
    let mut sink = FramedWrite::new(writer, ControlCodec::new());

    loop {
        let next = tokio::select! {
            () = ct.cancelled() => break,
            next = lines.next() => next,
        };

        let request = match next {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                warn!(?channel, %err, "read error");
                break;
            }
            None => break,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = Exchange {
            channel,
            request,
            reply: reply_tx,
        };
        if inbox.send(exchange).await.is_err() {
            debug!(?channel, "server loop is gone");
            break;
        }
        let Ok(outgoing) = reply_rx.await else {
            break;
        };

        match tokio::time::timeout(reply_timeout, sink.send(outgoing.payload)).await {
            Ok(Ok(())) => {
                let _ = outgoing.delivered.send(());
            }
            Ok(Err(err)) => {
                warn!(?channel, %err, "error sending back message");
                break;
            }
            Err(_) => {
                warn!(?channel, "reply write timed out");
                break;
            }
        }
    }

    debug!(?channel, "connection closed");
}

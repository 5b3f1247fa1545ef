//! Request-reply client for the agent channel.
//!
//! One connection carries strictly alternating request and reply lines. A
//! connection that stalls mid-exchange is never reused: a late reply left on
//! it would be read as the answer to the next request.

use std::time::Duration;

use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::models::command::Command;
use crate::models::message::Inbound;
use crate::protocol::{self, codec::ControlCodec};
use crate::{AppError, Result};

/// Bounds of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimings {
    /// Bound on connecting and on writing the request.
    pub send_timeout: Duration,
    /// Bound on each receive attempt.
    pub recv_timeout: Duration,
    /// Number of receive attempts before the connection is discarded.
    pub recv_attempts: u32,
}

/// Agent side of the agent channel.
#[derive(Debug)]
pub struct AgentClient {
    addr: String,
    timings: ClientTimings,
    conn: Option<Framed<TcpStream, ControlCodec>>,
}

impl AgentClient {
    /// Client for the server at `addr`; connects lazily.
    #[must_use]
    pub fn new(addr: impl Into<String>, timings: ClientTimings) -> Self {
        Self {
            addr: addr.into(),
            timings,
            conn: None,
        }
    }

    /// Whether a connection is currently held open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Drop the current connection; the next exchange opens a fresh one.
    pub fn reset(&mut self) {
        if self.conn.take().is_some() {
            debug!(addr = %self.addr, "connection discarded");
        }
    }

    /// Send `message` and return the commands the server replied with.
    ///
    /// # Errors
    ///
    /// - `AppError::Timeout` if connecting, sending, or every receive
    ///   attempt runs out of time. The connection is discarded.
    /// - `AppError::Transport` if the connection fails or is closed. The
    ///   connection is discarded.
    /// - `AppError::Protocol` if the reply is not a command list.
    pub async fn exchange(&mut self, message: &Inbound) -> Result<Vec<Command>> {
        let line = protocol::encode(message)?;

        let result = self.send(line).await;
        if result.is_err() {
            self.reset();
        }
        result?;

        let reply = match self.receive().await {
            Ok(reply) => reply,
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };
        protocol::decode::<Vec<Command>>(&reply)
    }

    async fn connection(&mut self) -> Result<&mut Framed<TcpStream, ControlCodec>> {
        if self.conn.is_none() {
            let stream = tokio::time::timeout(
                self.timings.send_timeout,
                TcpStream::connect(self.addr.as_str()),
            )
            .await
            .map_err(|_| AppError::Timeout(format!("connecting to {} timed out", self.addr)))?
            .map_err(|err| AppError::Transport(format!("failed to connect to {}: {err}", self.addr)))?;
            info!(addr = %self.addr, "connected to control server");
            self.conn = Some(Framed::new(stream, ControlCodec::new()));
        }
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::Transport("connection unavailable".into()))
    }

    async fn send(&mut self, line: String) -> Result<()> {
        let send_timeout = self.timings.send_timeout;
        let conn = self.connection().await?;
        match tokio::time::timeout(send_timeout, conn.send(line)).await {
            Ok(sent) => sent.map_err(into_transport),
            Err(_) => Err(AppError::Timeout("sending status timed out".into())),
        }
    }

    /// Wait for the reply over up to `recv_attempts` bounded attempts.
    ///
    /// Lines that are already buffered behind the first reply are drained
    /// and the last one wins. With one reply per request this yields the
    /// same line as waiting out every attempt and keeping the last receive.
    async fn receive(&mut self) -> Result<String> {
        let ClientTimings {
            recv_timeout,
            recv_attempts,
            ..
        } = self.timings;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| AppError::Transport("not connected".into()))?;

        let mut reply = None;
        for attempt in 1..=recv_attempts {
            match tokio::time::timeout(recv_timeout, conn.next()).await {
                Ok(Some(Ok(line))) => {
                    reply = Some(line);
                    break;
                }
                Ok(Some(Err(err))) => return Err(into_transport(err)),
                Ok(None) => {
                    return Err(AppError::Transport("server closed the connection".into()))
                }
                Err(_) => debug!(attempt, "no reply yet"),
            }
        }

        let Some(mut reply) = reply else {
            warn!(attempts = recv_attempts, "no reply from server, replacing connection");
            return Err(AppError::Timeout(format!(
                "no reply after {recv_attempts} attempts"
            )));
        };
        while let Some(Some(Ok(line))) = conn.next().now_or_never() {
            reply = line;
        }
        Ok(reply)
    }
}

/// Socket failures surface from the codec as `Io`; report them as transport
/// failures so callers see one error kind per failed exchange.
fn into_transport(err: AppError) -> AppError {
    match err {
        AppError::Io(msg) => AppError::Transport(msg),
        other => other,
    }
}

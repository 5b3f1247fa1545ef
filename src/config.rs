//! Cluster configuration parsing and validation.
//!
//! A single TOML file carries a `[server]` and an `[agent]` section. Every
//! key has a default, so an empty file (or no file at all) yields a usable
//! configuration with the stock timings.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::models::status::AgentKind;
use crate::{AppError, Result};

fn default_agent_addr() -> String {
    "0.0.0.0:5558".into()
}

fn default_admin_addr() -> String {
    "0.0.0.0:5559".into()
}

#[allow(clippy::unnecessary_wraps)] // serde default must match the field type
fn default_admin_ipc_name() -> Option<String> {
    Some("monitored-cluster.sock".into())
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_reply_timeout_ms() -> u64 {
    200
}

fn default_cull_timeout_seconds() -> u64 {
    20
}

fn default_sampler_interval_seconds() -> u64 {
    5
}

fn default_server_addr() -> String {
    "localhost:5558".into()
}

fn default_command() -> String {
    "ipengine > /dev/null 2> /dev/null".into()
}

fn default_update_cycle_seconds() -> u64 {
    5
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_recv_timeout_ms() -> u64 {
    1000
}

fn default_recv_attempts() -> u32 {
    3
}

fn default_queue_wait_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_interrupt_grace_ms() -> u64 {
    3000
}

fn default_terminate_grace_ms() -> u64 {
    1000
}

fn default_stats_window_ms() -> u64 {
    1000
}

fn default_stats_samples() -> u32 {
    4
}

/// Control server settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// TCP bind address for agent status exchanges.
    #[serde(default = "default_agent_addr")]
    pub agent_addr: String,
    /// TCP bind address for network-reachable admin commands.
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,
    /// Local socket name for local-only admin commands; `None` disables it.
    #[serde(default = "default_admin_ipc_name")]
    pub admin_ipc_name: Option<String>,
    /// Upper bound on how long the event loop waits for traffic.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Window in which a reply write must be confirmed.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Inactivity threshold after which agent records are culled.
    #[serde(default = "default_cull_timeout_seconds")]
    pub cull_timeout_seconds: u64,
    /// Interval between workload provider samples.
    #[serde(default = "default_sampler_interval_seconds")]
    pub sampler_interval_seconds: u64,
    /// Command whose stdout reports the workload status as JSON.
    #[serde(default)]
    pub workload_command: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            agent_addr: default_agent_addr(),
            admin_addr: default_admin_addr(),
            admin_ipc_name: default_admin_ipc_name(),
            poll_interval_ms: default_poll_interval_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
            cull_timeout_seconds: default_cull_timeout_seconds(),
            sampler_interval_seconds: default_sampler_interval_seconds(),
            workload_command: None,
        }
    }
}

impl ServerConfig {
    /// Event loop poll bound.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reply confirmation window.
    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Inactivity threshold for culling.
    #[must_use]
    pub fn cull_timeout(&self) -> Duration {
        Duration::from_secs(self.cull_timeout_seconds)
    }

    /// Workload sampler period.
    #[must_use]
    pub fn sampler_interval(&self) -> Duration {
        Duration::from_secs(self.sampler_interval_seconds)
    }
}

/// Agent settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Address of the server's agent channel.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Role this agent reports as.
    #[serde(default)]
    pub kind: AgentKind,
    /// Shell command line of the supervised process.
    #[serde(default = "default_command")]
    pub command: String,
    /// Period of the status exchange.
    #[serde(default = "default_update_cycle_seconds")]
    pub update_cycle_seconds: u64,
    /// Bound on connecting and writing a status report.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Bound on each reply receive attempt.
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    /// Number of receive attempts per exchange.
    #[serde(default = "default_recv_attempts")]
    pub recv_attempts: u32,
    /// Bound on the control loop's wait for a local command.
    #[serde(default = "default_queue_wait_ms")]
    pub queue_wait_ms: u64,
    /// Restart the supervised process whenever it is found dead.
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    /// Wait after the interrupt signal before escalating.
    #[serde(default = "default_interrupt_grace_ms")]
    pub interrupt_grace_ms: u64,
    /// Wait after the terminate signal before force-killing.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// Window over which resource stats are averaged.
    #[serde(default = "default_stats_window_ms")]
    pub stats_window_ms: u64,
    /// Number of samples taken within the stats window.
    #[serde(default = "default_stats_samples")]
    pub stats_samples: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            kind: AgentKind::default(),
            command: default_command(),
            update_cycle_seconds: default_update_cycle_seconds(),
            send_timeout_ms: default_send_timeout_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            recv_attempts: default_recv_attempts(),
            queue_wait_ms: default_queue_wait_ms(),
            auto_restart: true,
            interrupt_grace_ms: default_interrupt_grace_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            stats_window_ms: default_stats_window_ms(),
            stats_samples: default_stats_samples(),
        }
    }
}

impl AgentConfig {
    /// Status exchange period.
    #[must_use]
    pub fn update_cycle(&self) -> Duration {
        Duration::from_secs(self.update_cycle_seconds)
    }

    /// Connect/send bound.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Per-attempt receive bound.
    #[must_use]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Control loop queue wait bound.
    #[must_use]
    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    /// Grace after interrupt.
    #[must_use]
    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }

    /// Grace after terminate.
    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    /// Stats averaging window.
    #[must_use]
    pub fn stats_window(&self) -> Duration {
        Duration::from_millis(self.stats_window_ms)
    }
}

/// Top-level configuration parsed from `cluster.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    /// Control server section.
    #[serde(default)]
    pub server: ServerConfig,
    /// Agent section.
    #[serde(default)]
    pub agent: AgentConfig,
}

impl ClusterConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("server.poll_interval_ms", self.server.poll_interval_ms),
            ("server.reply_timeout_ms", self.server.reply_timeout_ms),
            ("server.cull_timeout_seconds", self.server.cull_timeout_seconds),
            (
                "server.sampler_interval_seconds",
                self.server.sampler_interval_seconds,
            ),
            ("agent.update_cycle_seconds", self.agent.update_cycle_seconds),
            ("agent.send_timeout_ms", self.agent.send_timeout_ms),
            ("agent.recv_timeout_ms", self.agent.recv_timeout_ms),
            ("agent.queue_wait_ms", self.agent.queue_wait_ms),
        ];
        if let Some((key, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("{key} must be greater than zero")));
        }

        if self.agent.recv_attempts == 0 {
            return Err(AppError::Config(
                "agent.recv_attempts must be greater than zero".into(),
            ));
        }

        if self.agent.stats_samples == 0 {
            return Err(AppError::Config(
                "agent.stats_samples must be greater than zero".into(),
            ));
        }

        if self.agent.command.trim().is_empty() {
            return Err(AppError::Config("agent.command must not be empty".into()));
        }

        if let Some(ref argv) = self.server.workload_command {
            if argv.is_empty() {
                return Err(AppError::Config(
                    "server.workload_command must not be an empty list".into(),
                ));
            }
        }

        Ok(())
    }
}

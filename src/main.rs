#![forbid(unsafe_code)]

//! `monitored-cluster`: control server and agent binary.
//!
//! `server` runs the registry and command queues behind the agent channel
//! and both admin channels. `agent` supervises one worker or scheduler
//! process and reports it to the server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use monitored_cluster::config::ClusterConfig;
use monitored_cluster::models::status::AgentKind;
use monitored_cluster::providers::procfs::ProcfsStatsProvider;
use monitored_cluster::providers::workload::{
    CommandWorkloadProvider, UnconfiguredWorkloadProvider,
};
use monitored_cluster::providers::WorkloadStatusProvider;
use monitored_cluster::{agent, host, server, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum KindArg {
    Worker,
    Scheduler,
}

impl From<KindArg> for AgentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Worker => Self::Worker,
            KindArg::Scheduler => Self::Scheduler,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "monitored-cluster", about = "Monitored cluster control plane", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run the control server.
    Server {
        /// Agent channel bind address.
        #[arg(long)]
        agent_addr: Option<String>,
        /// Network admin channel bind address.
        #[arg(long)]
        admin_addr: Option<String>,
        /// Local admin socket name.
        #[arg(long)]
        ipc_name: Option<String>,
        /// Do not open the local admin socket.
        #[arg(long, conflicts_with = "ipc_name")]
        no_ipc: bool,
    },

    /// Run a worker or scheduler agent.
    Agent {
        /// Control server address (`host:port`).
        #[arg(long)]
        server: Option<String>,
        /// Role reported to the server.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Leave the process dead when it exits on its own.
        #[arg(long)]
        no_auto_restart: bool,
        /// Command line of the supervised process.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => ClusterConfig::load_from_path(path)?,
        None => ClusterConfig::default(),
    };

    match args.command {
        Mode::Server {
            agent_addr,
            admin_addr,
            ipc_name,
            no_ipc,
        } => {
            if let Some(addr) = agent_addr {
                config.server.agent_addr = addr;
            }
            if let Some(addr) = admin_addr {
                config.server.admin_addr = addr;
            }
            if ipc_name.is_some() {
                config.server.admin_ipc_name = ipc_name;
            }
            if no_ipc {
                config.server.admin_ipc_name = None;
            }
            config.validate()?;
            run_server(&config).await
        }
        Mode::Agent {
            server,
            kind,
            no_auto_restart,
            command,
        } => {
            if let Some(addr) = server {
                config.agent.server_addr = addr;
            }
            if let Some(kind) = kind {
                config.agent.kind = kind.into();
            }
            if no_auto_restart {
                config.agent.auto_restart = false;
            }
            if !command.is_empty() {
                config.agent.command = command.join(" ");
            }
            config.validate()?;
            run_agent(&config).await
        }
    }
}

async fn run_server(config: &ClusterConfig) -> Result<()> {
    let workload: Arc<dyn WorkloadStatusProvider> = match config.server.workload_command {
        Some(ref argv) => Arc::new(CommandWorkloadProvider::new(argv.clone())?),
        None => {
            info!("no workload command configured; workload will report unknown");
            Arc::new(UnconfiguredWorkloadProvider)
        }
    };

    let ct = CancellationToken::new();
    let handle = server::start(&config.server, host::local_hostname(), workload, ct.clone()).await?;
    info!("control server ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let registry = handle.join().await?;
    info!(
        workers = registry.worker_count(),
        scheduler = registry.scheduler().is_some(),
        "control server shut down"
    );
    Ok(())
}

async fn run_agent(config: &ClusterConfig) -> Result<()> {
    let stats = Arc::new(ProcfsStatsProvider::new(
        config.agent.stats_window(),
        config.agent.stats_samples,
    ));

    let interrupt = CancellationToken::new();
    let signal_token = interrupt.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let result = agent::run_agent(&config.agent, stats, interrupt).await;
    signal_task.abort();
    if let Err(ref err) = result {
        error!(%err, "agent failed");
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            let _ = ctrl_c.await;
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

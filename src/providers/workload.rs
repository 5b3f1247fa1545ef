//! Workload status providers.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::{ProviderFuture, WorkloadStatusProvider};
use crate::models::workload::WorkloadStatus;
use crate::{AppError, Result};

/// Maximum time a workload probe command may run.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a probe command whose stdout is a JSON object
/// `{"n_workers": …, "n_pending": …, "n_working": …}`.
#[derive(Debug, Clone)]
pub struct CommandWorkloadProvider {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandWorkloadProvider {
    /// Create a provider for `argv` with the default [`PROBE_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `argv` is empty.
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(AppError::Config("workload command must not be empty".into()));
        }
        Ok(Self {
            argv,
            timeout: PROBE_TIMEOUT,
        })
    }

    /// Override the probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_probe(&self) -> Result<WorkloadStatus> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| AppError::Provider("workload command is empty".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                AppError::Provider(format!(
                    "workload probe did not finish within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|err| AppError::Provider(format!("failed to run workload probe: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Provider(format!(
                "workload probe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout.trim(), "workload probe answered");
        serde_json::from_str(stdout.trim())
            .map_err(|err| AppError::Provider(format!("invalid workload probe output: {err}")))
    }
}

impl WorkloadStatusProvider for CommandWorkloadProvider {
    fn query(&self) -> ProviderFuture<'_, Result<WorkloadStatus>> {
        Box::pin(self.run_probe())
    }
}

/// Provider used when no workload probe is configured; every query fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredWorkloadProvider;

impl WorkloadStatusProvider for UnconfiguredWorkloadProvider {
    fn query(&self) -> ProviderFuture<'_, Result<WorkloadStatus>> {
        Box::pin(async {
            Err(AppError::Provider(
                "no workload provider configured".into(),
            ))
        })
    }
}

//! Cluster workload occupancy published by the background sampler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts reported by a workload status provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadStatus {
    /// Engines registered with the workload queue.
    pub n_workers: u64,
    /// Tasks queued, assigned, or unassigned.
    pub n_pending: u64,
    /// Engines with at least one task queued or running.
    pub n_working: u64,
}

/// Outcome of the most recent sample.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadState {
    /// No sample has completed yet.
    #[default]
    Unknown,
    /// Last sample succeeded.
    Connected,
    /// Last sample failed; counts are the last known values.
    Error,
}

/// Snapshot slot read by `info` handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    /// Outcome of the most recent sample.
    pub status: WorkloadState,
    /// Engines registered with the workload queue.
    pub n_workers: u64,
    /// Pending task count.
    pub n_pending: u64,
    /// Busy engine count.
    pub n_working: u64,
    /// Diagnostic text for the last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the last sample completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampled_at: Option<DateTime<Utc>>,
}

impl WorkloadSnapshot {
    /// Snapshot after a successful sample.
    #[must_use]
    pub fn connected(status: WorkloadStatus) -> Self {
        Self {
            status: WorkloadState::Connected,
            n_workers: status.n_workers,
            n_pending: status.n_pending,
            n_working: status.n_working,
            reason: None,
            sampled_at: Some(Utc::now()),
        }
    }

    /// Derive the snapshot after a failed sample, keeping last-known counts.
    #[must_use]
    pub fn failed(&self, reason: impl Into<String>) -> Self {
        Self {
            status: WorkloadState::Error,
            reason: Some(reason.into()),
            sampled_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}

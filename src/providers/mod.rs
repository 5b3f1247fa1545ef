//! External collaborators queried by the server and the agents.
//!
//! The control plane only depends on the two traits defined here. The
//! concrete implementations shipped with the crate are a `/proc` sampler for
//! process-tree resource usage and a command-backed workload probe.

pub mod procfs;
pub mod workload;

use std::future::Future;
use std::pin::Pin;

use crate::models::status::ResourceStats;
use crate::models::workload::WorkloadStatus;
use crate::Result;

/// Boxed future returned by provider trait methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of per-process-tree resource usage.
pub trait ProcessStatsProvider: Send + Sync {
    /// Sample usage of `pid` and all its descendants.
    ///
    /// Returns `None` when the process vanished while being sampled.
    fn sample(&self, pid: u32) -> ProviderFuture<'_, Option<ResourceStats>>;
}

/// Source of cluster task-queue occupancy.
pub trait WorkloadStatusProvider: Send + Sync {
    /// Query the current worker and task counts.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) when the
    /// workload queue cannot be reached or answers with garbage.
    fn query(&self) -> ProviderFuture<'_, Result<WorkloadStatus>>;
}

#![forbid(unsafe_code)]

//! Control plane for a monitored worker/scheduler cluster.
//!
//! The [`server`] keeps a registry of agents, queues administrative
//! commands for them, and culls agents that stop reporting. Each [`agent`]
//! supervises one subprocess and exchanges status with the server.

pub mod agent;
pub mod config;
pub mod errors;
pub mod host;
pub mod models;
pub mod protocol;
pub mod providers;
pub mod server;

pub use config::ClusterConfig;
pub use errors::{AppError, Result};

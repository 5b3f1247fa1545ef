//! Domain model module declarations.

pub mod command;
pub mod message;
pub mod record;
pub mod status;
pub mod workload;

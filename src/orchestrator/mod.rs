//! Deployment group orchestrator (C6, §4.6): select -> layer -> persist ->
//! execute -> rollback -> cancel, serialized per `(project, environment)`.

#![cfg(feature = "server")]

pub mod graph;
pub mod group;
pub mod state_machine;
pub mod worker_pool;

pub use group::{CreateGroupRequest, Orchestrator};

//! enclii: a control plane that turns a declarative service specification
//! plus a git commit into a running, exposed, observable workload on a
//! Kubernetes-class cluster (see `SPEC_FULL.md`).
//!
//! Module layout mirrors the component table: `auth` is the identity gate
//! (C1), `db` is the repository store (C2), `spec` is the spec validator
//! (C3), `analyzer` is the source analyzer (C4), `build` is the build
//! pipeline (C5), `orchestrator` is the deployment group orchestrator (C6),
//! `reconciler` is the cluster reconciler (C7), `preview` is the preview
//! controller (C8), and `webhook` is the trigger router (C9). `http` is the
//! thin HTTP adaptor over all of the above.

pub mod analyzer;
pub mod auth;
pub mod db;
pub mod error;
pub mod spec;

#[cfg(feature = "server")]
pub mod build;
#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod http;
#[cfg(feature = "server")]
pub mod metrics;
#[cfg(feature = "server")]
pub mod orchestrator;
#[cfg(feature = "server")]
pub mod preview;
#[cfg(feature = "server")]
pub mod reconciler;
#[cfg(feature = "server")]
pub mod secrets;
#[cfg(feature = "server")]
pub mod supervisor;
#[cfg(feature = "server")]
pub mod webhook;

pub use error::{Error, ErrorKind, Result};

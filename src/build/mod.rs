//! Build pipeline (C5, §4.5): `build(service, git_sha) -> Release`, run
//! out-of-band of any user request.

#![cfg(feature = "server")]

pub mod builder;
pub mod clone;
pub mod coalesce;
pub mod image;
pub mod pipeline;
pub mod registry;
pub mod sbom;
pub mod sign;

pub use builder::{select_builder, BuilderKind};
pub use pipeline::{run_build, BuildRequest, Stage, StageFailure};

use std::time::Duration;

/// Per-stage timeouts (§4.5's time budget). Exceeding one is a stage
/// failure, not a crash: the pipeline always finalizes the Release to
/// `failed` rather than leaving it stuck in `building`.
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const SBOM_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const SIGN_TIMEOUT: Duration = Duration::from_secs(2 * 60);

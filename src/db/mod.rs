//! Repository store (C2, §4.2): the single source of truth for persisted
//! control-plane state. Every module here takes a `&PgPool` or a
//! `&mut Transaction` directly, following the teacher's free-function style
//! (`db::projects::list(pool, ...)`) rather than wrapping each table behind a
//! trait object — there is exactly one backing store in this system.

pub mod audit;
pub mod deployment_groups;
pub mod deployments;
pub mod dependencies;
pub mod domains;
pub mod env_vars;
pub mod environments;
pub mod models;
pub mod pagination;
pub mod previews;
pub mod project_grants;
pub mod projects;
pub mod releases;
pub mod routes;
pub mod services;
pub mod sessions;

#[cfg(feature = "server")]
mod pool;
#[cfg(feature = "server")]
pub use pool::{with_tx, Store};

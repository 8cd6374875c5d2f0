//! Preview controller (C8, §4.8): ephemeral, pull-request-scoped
//! environments with a unique subdomain and idle-sleep.

#![cfg(feature = "server")]

pub mod controller;
pub mod sweeper;

pub use controller::PreviewController;

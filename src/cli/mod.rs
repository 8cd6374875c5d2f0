//! Client command surface (§6 AMBIENT): a thin `reqwest`-based CLI over the
//! HTTP API, grounded on the teacher's `rise-cli` crate — same local config
//! file, same nested-subcommand shape, same env-var override names adapted
//! to this project (`ENCLII_TOKEN`/`ENCLII_URL` in place of
//! `RISE_TOKEN`/`RISE_URL`).

#![cfg(feature = "cli")]

pub mod client;
pub mod commands;
pub mod config;
pub mod login;

//! Webhook + trigger router (C9, §4.9): verifies source-control webhook
//! signatures, parses push/pull-request events, maps changed paths to
//! affected services, and hands off to the orchestrator (C6) or preview
//! controller (C8).

#![cfg(feature = "server")]

pub mod dedup;
pub mod router;
pub mod signature;

pub use dedup::DeliveryDedup;
pub use router::{PullRequestAction, PullRequestEvent, PushEvent, WebhookOutcome};

//! Identity gate (C1, §4.1): the single path every mutating operation
//! traverses. `authenticate` validates a bearer token and resolves the
//! calling identity; `authorize` checks that identity against the RBAC
//! table for the requested action.

pub mod jwt;
pub mod rbac;
pub mod session_cache;

#[cfg(feature = "server")]
pub mod jwks;
#[cfg(feature = "server")]
pub mod middleware;
#[cfg(feature = "server")]
pub mod oidc;

use serde::{Deserialize, Serialize};

/// The resolved identity behind a validated token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub subject: String,
    pub session_id: String,
    pub role: crate::db::models::Role,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Self-issued tokens signed with a local RSA keypair, verified against
    /// the locally published JWKS document.
    Local,
    /// Tokens issued by an external OIDC provider, verified against its
    /// published JWKS, discovered via `.well-known/openid-configuration`.
    Federated,
}

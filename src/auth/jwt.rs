//! Token claims shared by local and federated verification. Grounded on the
//! teacher's `server/auth/jwt.rs`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id or service-account id.
    pub sub: String,
    /// Audience: must match this deployment's configured audience.
    pub aud: String,
    /// Issuer.
    pub iss: String,
    /// Session id, checked against the revocation cache on every request.
    pub sid: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Claims {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.exp <= now_unix
    }
}

#[cfg(feature = "server")]
mod verify {
    use super::Claims;
    use crate::error::{Error, Result};
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    /// Verifies signature, expiry, and audience. Does **not** check
    /// revocation — callers must consult the session cache separately
    /// (§4.1: "Tokens are validated on every request; there is no in-memory
    /// trust between calls").
    pub fn verify_rs256(
        token: &str,
        decoding_key: &DecodingKey,
        expected_audience: &str,
    ) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[expected_audience]);
        let data = decode::<Claims>(token, decoding_key, &validation)
            .map_err(|e| Error::auth(format!("invalid token: {e}")))?;
        Ok(data.claims)
    }
}

#[cfg(feature = "server")]
pub use verify::verify_rs256;

#[cfg(feature = "server")]
pub struct JwtSigner {
    encoding_key: jsonwebtoken::EncodingKey,
    issuer: String,
    audience: String,
}

#[cfg(feature = "server")]
impl JwtSigner {
    pub fn new(rsa_private_key_pem: &[u8], issuer: String, audience: String) -> anyhow::Result<Self> {
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(rsa_private_key_pem)?;
        Ok(Self {
            encoding_key,
            issuer,
            audience,
        })
    }

    pub fn issue(&self, subject: &str, session_id: &str, scopes: Vec<String>, ttl_secs: i64) -> anyhow::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            sid: session_id.to_string(),
            iat: now,
            exp: now + ttl_secs,
            scopes,
        };
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_claims_are_detected() {
        let claims = Claims {
            sub: "user".into(),
            aud: "enclii".into(),
            iss: "enclii".into(),
            sid: "sess".into(),
            iat: 0,
            exp: 100,
            scopes: vec![],
        };
        assert!(claims.is_expired(200));
        assert!(!claims.is_expired(50));
    }
}

//! JWKS publication (local mode) and JWKS caching (federated mode).
//!
//! §9 redesign flag: "Per-instance cryptographic material for session tokens"
//! is wrong in a multi-replica deployment — the signing key must be shared
//! via the secret store and every replica publishes the same public key at
//! `/auth/jwks` so any replica can verify any other replica's tokens.

#![cfg(feature = "server")]

use base64::Engine;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default = "default_kty")]
    pub kty: String,
    #[serde(default)]
    pub alg: String,
    #[serde(rename = "use", default)]
    pub use_: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

fn default_kty() -> String {
    "RSA".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

fn b64url(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the JWKS document served at `/auth/jwks` from the local signing
/// keypair's public half (local-mode identity gate).
pub fn jwks_from_public_key_pem(pem: &str, kid: &str) -> anyhow::Result<JwksDocument> {
    let public_key = RsaPublicKey::from_pkcs1_pem(pem)?;
    let n = public_key.n().to_bytes_be();
    let e = public_key.e().to_bytes_be();
    Ok(JwksDocument {
        keys: vec![Jwk {
            kty: "RSA".to_string(),
            alg: "RS256".to_string(),
            use_: "sig".to_string(),
            kid: kid.to_string(),
            n: b64url(&n),
            e: b64url(&e),
        }],
    })
}

/// Federated-mode JWKS cache: fetched lazily on `kid` miss, refreshed on a
/// timer. A bounded `moka` cache backs this so a misbehaving issuer rotating
/// keys rapidly cannot grow memory without bound (§5, §9).
pub struct JwksCache {
    issuer_jwks_uri: String,
    http: reqwest::Client,
    cache: moka::future::Cache<String, DecodingKeyHandle>,
}

/// `jsonwebtoken::DecodingKey` isn't `Clone`-cheap to rebuild; wrap it so the
/// cache can hand out shared handles.
#[derive(Clone)]
pub struct DecodingKeyHandle(std::sync::Arc<jsonwebtoken::DecodingKey>);

impl DecodingKeyHandle {
    pub fn as_ref(&self) -> &jsonwebtoken::DecodingKey {
        &self.0
    }
}

impl JwksCache {
    pub fn new(issuer_jwks_uri: String) -> Self {
        Self {
            issuer_jwks_uri,
            http: reqwest::Client::new(),
            cache: moka::future::Cache::builder()
                .max_capacity(64)
                .time_to_live(std::time::Duration::from_secs(3600))
                .build(),
        }
    }

    pub async fn get(&self, kid: &str) -> anyhow::Result<DecodingKeyHandle> {
        if let Some(handle) = self.cache.get(kid).await {
            return Ok(handle);
        }
        self.refresh().await?;
        self.cache
            .get(kid)
            .await
            .ok_or_else(|| anyhow::anyhow!("unknown JWKS kid: {kid}"))
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        let doc: JwksDocument = self
            .http
            .get(&self.issuer_jwks_uri)
            .send()
            .await?
            .json()
            .await?;
        for jwk in doc.keys {
            let decoding_key = jsonwebtoken::DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
            self.cache
                .insert(jwk.kid.clone(), DecodingKeyHandle(std::sync::Arc::new(decoding_key)))
                .await;
        }
        Ok(())
    }
}

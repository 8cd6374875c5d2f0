//! Federated verification: OIDC discovery + cached JWKS (§4.1).

#![cfg(feature = "server")]

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OidcMetadata {
    pub issuer: String,
    pub jwks_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

/// Fetches `{issuer}/.well-known/openid-configuration` once at startup.
pub async fn discover(issuer: &str) -> anyhow::Result<OidcMetadata> {
    let url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
    let metadata = reqwest::get(url).await?.json::<OidcMetadata>().await?;
    Ok(metadata)
}

pub struct FederatedValidator {
    pub metadata: OidcMetadata,
    pub jwks: super::jwks::JwksCache,
    pub audience: String,
}

impl FederatedValidator {
    pub async fn new(issuer: &str, audience: String) -> anyhow::Result<Self> {
        let metadata = discover(issuer).await?;
        let jwks = super::jwks::JwksCache::new(metadata.jwks_uri.clone());
        Ok(Self {
            metadata,
            jwks,
            audience,
        })
    }

    pub async fn verify(&self, token: &str) -> crate::error::Result<super::jwt::Claims> {
        use crate::error::Error;
        use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

        let header = decode_header(token).map_err(|e| Error::auth(format!("bad token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| Error::auth("token is missing a key id"))?;
        let key = self
            .jwks
            .get(&kid)
            .await
            .map_err(|e| Error::auth(format!("failed to resolve signing key: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.metadata.issuer]);
        let data = decode::<super::jwt::Claims>(token, key.as_ref(), &validation)
            .map_err(|e| Error::auth(format!("invalid token: {e}")))?;
        Ok(data.claims)
    }
}

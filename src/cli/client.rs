//! Thin HTTP client over the control plane's API (§6), mirroring the
//! teacher's pattern of building request URLs against a configured
//! `backend_url` and attaching the stored bearer token by hand rather than
//! generating a client from an OpenAPI spec.

use anyhow::{bail, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        // `Url::join` treats the base's final path segment as replaceable,
        // so a bare root URL must end in `/` or the first request eats it.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)?;
        Ok(Self {
            http: Client::new(),
            base_url,
            token,
        })
    }

    async fn send<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<reqwest::Response> {
        let url = self.base_url.join(path)?;
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("request failed ({status}): {body}");
        }
        Ok(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.send::<()>(Method::GET, path, None).await?.json().await?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Ok(self.send(Method::POST, path, Some(body)).await?.json().await?)
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Ok(self.send(Method::PUT, path, Some(body)).await?.json().await?)
    }

    /// `POST` with no request body and no response body, for action
    /// endpoints like rollback/approve that return `204 No Content`.
    pub async fn post_action(&self, path: &str) -> Result<()> {
        self.send::<()>(Method::POST, path, None).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.send::<()>(Method::DELETE, path, None).await?;
        if response.status() != StatusCode::NO_CONTENT {
            let _ = response.bytes().await;
        }
        Ok(())
    }
}

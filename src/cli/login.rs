//! `enclii login`: local-mode authentication, grounded on the teacher's
//! `rise-cli::login::handle_login` (stdin-prompted credentials POSTed to
//! `/auth/login`), adapted to enclii's subject/scopes login shape — local
//! mode has no password of its own, since the identity gate trusts whatever
//! subject the caller names (§4.1: password auth belongs to federated IdPs).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use super::client::ApiClient;
use super::config::Config;

#[derive(Debug, Serialize)]
struct LoginRequest {
    subject: String,
    scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

pub async fn handle_login(backend_url: &str, config: &mut Config) -> Result<()> {
    print!("Subject: ");
    io::stdout().flush()?;
    let mut subject = String::new();
    io::stdin().read_line(&mut subject)?;
    let subject = subject.trim().to_string();

    let client = ApiClient::new(backend_url, None)?;
    let response: LoginResponse = client
        .post(
            "auth/login",
            &LoginRequest {
                subject,
                scopes: Vec::new(),
            },
        )
        .await
        .context("login request failed")?;

    config.set_token(response.token)?;
    println!("login successful, token stored");
    Ok(())
}

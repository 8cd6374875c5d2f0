//! Local CLI config file (`~/.config/enclii/config.json`), grounded on the
//! teacher's `rise-cli::config::Config`: same env-var-first, file-fallback
//! lookup for the token and backend URL.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

// TODO: use the `keyring` crate for secure token storage instead of a plain
// JSON file once enclii ships a packaged CLI distribution.

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub token: Option<String>,
    pub backend_url: Option<String>,
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("failed to determine home directory")?;
        let config_dir = home.join(".config").join("enclii");
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("failed to create config directory")?;
        }
        Ok(config_dir.join("config.json"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;
        serde_json::from_str(&contents).context("failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&config_path, json).context("failed to write config file")
    }

    pub fn set_token(&mut self, token: String) -> Result<()> {
        self.token = Some(token);
        self.save()
    }

    /// `ENCLII_TOKEN` takes precedence over the stored token so CI jobs can
    /// inject one without touching the config file.
    pub fn get_token(&self) -> Option<String> {
        std::env::var("ENCLII_TOKEN").ok().or_else(|| self.token.clone())
    }

    pub fn set_backend_url(&mut self, url: String) -> Result<()> {
        self.backend_url = Some(url);
        self.save()
    }

    pub fn get_backend_url(&self) -> String {
        if let Ok(url) = std::env::var("ENCLII_URL") {
            return url;
        }
        self.backend_url.clone().unwrap_or_else(|| "http://localhost:8080".to_string())
    }
}

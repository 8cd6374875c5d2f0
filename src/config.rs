//! Settings (§5/§9 AMBIENT): layered TOML/YAML config files plus
//! environment variable overrides, grounded on the teacher's
//! `server/settings.rs`. Scoped down to what this control plane actually
//! needs to boot: no AWS/ECR registry table, no namespace-template
//! validation — enclii's Kubernetes backend takes its ingress class and TLS
//! secret name directly rather than templating a namespace string.

#![cfg(feature = "server")]

use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub kubernetes: KubernetesSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub public_url: String,
    /// Previews are served at `pr-{n}-{project}-{rand}.{preview_base_domain}`.
    #[serde(default = "default_preview_base_domain")]
    pub preview_base_domain: String,
    #[serde(default = "default_webhook_secret")]
    pub webhook_secret: String,
}

fn default_preview_base_domain() -> String {
    "previews.enclii.dev".to_string()
}

fn default_webhook_secret() -> String {
    String::new()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// `"local"` (self-issued RSA-signed tokens) or `"federated"` (external
    /// OIDC issuer), per §4.1.
    #[serde(default = "default_auth_mode")]
    pub mode: String,
    pub audience: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    /// PKCS#1 PEM path, local mode only.
    #[serde(default)]
    pub local_signing_key_path: Option<String>,
    #[serde(default = "default_jwks_kid")]
    pub jwks_kid: String,
    #[serde(default)]
    pub oidc_issuer_url: Option<String>,
    #[serde(default)]
    pub oidc_client_id: Option<String>,
    #[serde(default)]
    pub oidc_client_secret: Option<String>,
    #[serde(default)]
    pub oidc_redirect_url: Option<String>,
    #[serde(default = "default_revocation_cache_capacity")]
    pub revocation_cache_capacity: u64,
    /// §4.1: a revocation-cache miss is a soft-fail by default; this flips
    /// it to fail-closed.
    #[serde(default)]
    pub strict_revocation_check: bool,
    /// Global role grants by subject. Per-project grants live in the
    /// repository store (`db::project_grants`) and layer on top of these.
    #[serde(default)]
    pub admin_subjects: Vec<String>,
    #[serde(default)]
    pub developer_subjects: Vec<String>,
}

fn default_auth_mode() -> String {
    "local".to_string()
}

fn default_issuer() -> String {
    "enclii".to_string()
}

fn default_token_ttl() -> i64 {
    3600
}

fn default_jwks_kid() -> String {
    "enclii-local-1".to_string()
}

fn default_revocation_cache_capacity() -> u64 {
    50_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSettings {
    /// How often the idle-sleep sweeper checks for inactive previews (§4.8).
    #[serde(default = "default_preview_sweep_interval")]
    pub preview_sweep_interval_secs: u64,
    /// Inactivity window before a preview is put to sleep (§4.8).
    #[serde(default = "default_preview_auto_sleep_after")]
    pub preview_auto_sleep_after_secs: i64,
}

fn default_preview_sweep_interval() -> u64 {
    60
}

fn default_preview_auto_sleep_after() -> i64 {
    30 * 60
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            preview_sweep_interval_secs: default_preview_sweep_interval(),
            preview_auto_sleep_after_secs: default_preview_auto_sleep_after(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EncryptionSettings {
    /// Base64, must decode to exactly 32 bytes (AES-256). Required to start
    /// the server; there is no "no encryption" mode (§3: values encrypted
    /// at rest).
    #[serde(default)]
    pub key_b64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    #[serde(default = "default_sbom_store_prefix")]
    pub sbom_store_prefix: String,
    #[serde(default)]
    pub cosign_key_ref: String,
    #[serde(default = "default_signature_store_prefix")]
    pub signature_store_prefix: String,
}

fn default_registry_url() -> String {
    "registry.internal".to_string()
}

fn default_sbom_store_prefix() -> String {
    "/var/lib/enclii/sboms".to_string()
}

fn default_signature_store_prefix() -> String {
    "/var/lib/enclii/signatures".to_string()
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            sbom_store_prefix: default_sbom_store_prefix(),
            cosign_key_ref: String::new(),
            signature_store_prefix: default_signature_store_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KubernetesSettings {
    #[serde(default)]
    pub kubeconfig: Option<String>,
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,
    #[serde(default)]
    pub ingress_tls_secret_name: Option<String>,
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

impl Settings {
    /// Replaces `${VAR_NAME}` or `${VAR_NAME:-default}` with the matching
    /// environment variable, leaving the rest of the string untouched.
    fn substitute_env_vars_in_string(s: &str) -> String {
        let re = regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
        re.replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());
            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
    }

    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;
        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => serde_json::Value::String(Self::substitute_env_vars_in_string(s)),
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::config_value_to_json).collect())
            }
        }
    }

    /// Tries `{dir}/{name}.{toml,yaml,yml}` in that order; returns whether a
    /// file was found.
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
        required: bool,
    ) -> Result<bool, ConfigError> {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{config_dir}/{name}.{ext}");
            if std::path::Path::new(&path).exists() {
                tracing::info!(path, "loading config file");
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{config_dir}/{name}")));
                return Ok(true);
            }
        }
        if required {
            Err(ConfigError::Message(format!(
                "required config file not found: {config_dir}/{name}.{{toml,yaml,yml}}"
            )))
        } else {
            Ok(false)
        }
    }

    /// Loads `default` (required), then `$ENCLII_RUN_MODE` (optional), then
    /// `local` (optional, not checked into git), each layer overriding the
    /// last. `DATABASE_URL` always wins over any file, matching the common
    /// convention of injecting it from the deployment platform.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("ENCLII_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("ENCLII_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let mut builder = Config::builder();
        let default_loaded = Self::try_add_config_file(&mut builder, &config_dir, "default", true)?;
        if !default_loaded {
            return Err(ConfigError::Message(format!(
                "required default config not found in {config_dir} (tried default.toml, default.yaml, default.yml)"
            )));
        }
        Self::try_add_config_file(&mut builder, &config_dir, &run_mode, false)?;
        Self::try_add_config_file(&mut builder, &config_dir, "local", false)?;

        let config = builder.build()?;
        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("failed to read config table: {e}")))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }

        let mut settings: Settings = serde_json::from_value(serde_json::Value::Object(json_map))
            .map_err(|e| ConfigError::Message(format!("failed to deserialize settings: {e}")))?;

        if let Ok(database_url) = env::var("DATABASE_URL") {
            if !database_url.is_empty() {
                settings.database.url = database_url;
            }
        }
        if settings.database.url.is_empty() {
            return Err(ConfigError::Message(
                "database URL not configured: set DATABASE_URL or [database] url".to_string(),
            ));
        }
        if settings.auth.mode == "federated" && settings.auth.oidc_issuer_url.is_none() {
            return Err(ConfigError::Message(
                "auth.mode is \"federated\" but auth.oidc_issuer_url is not set".to_string(),
            ));
        }

        Ok(settings)
    }
}

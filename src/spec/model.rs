//! Canonical service specification schema (§6): `apiVersion: enclii.dev/v1`,
//! `kind: Service`.

use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "enclii.dev/v1";
pub const KIND: &str = "Service";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpecDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub source: Source,
    pub build: Build,
    pub runtime: Runtime,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    pub resources: Resources,
    #[serde(default)]
    pub replicas: Replicas,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub git: GitSource,
    pub app_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSource {
    pub repository: String,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    Dockerfile,
    Buildpacks,
    Nixpacks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    #[serde(rename = "type")]
    pub kind: BuildKind,
    pub dockerfile: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    pub ports: Vec<u16>,
    pub health_check: HealthCheck,
    #[serde(default)]
    pub env: Vec<EnvRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub path: String,
    pub port: u16,
    #[serde(default = "default_period")]
    pub period: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

fn default_period() -> u32 {
    10
}
fn default_timeout() -> u32 {
    3
}
fn default_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    pub host: String,
    pub path: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replicas {
    #[serde(default = "default_min_replicas")]
    pub min: u32,
    #[serde(default = "default_max_replicas")]
    pub max: u32,
    pub target_cpu: Option<u32>,
}

fn default_min_replicas() -> u32 {
    1
}
fn default_max_replicas() -> u32 {
    1
}

impl Default for Replicas {
    fn default() -> Self {
        Self {
            min: default_min_replicas(),
            max: default_max_replicas(),
            target_cpu: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub mount_path: String,
    pub size: String,
}

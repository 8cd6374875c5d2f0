//! Spec validator (C3, §4.3). Parses, applies structural + semantic rules,
//! and produces either a canonical fully-defaulted spec or a `ValidationError`
//! naming every failing field path (not just the first).

use super::model::{ServiceSpecDocument, API_VERSION, KIND};
use crate::error::{Error, FieldError, Result};
use std::collections::HashSet;

const ALLOWED_GIT_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// A DNS label: lowercase alphanumerics and hyphens, 1-63 chars, must not
/// start or end with a hyphen.
fn is_valid_dns_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(is_valid_dns_label)
}

fn is_valid_git_url(s: &str) -> bool {
    if let Some(rest) = s.strip_prefix("https://") {
        let host = rest.split('/').next().unwrap_or("");
        return ALLOWED_GIT_HOSTS.contains(&host);
    }
    if let Some(rest) = s.strip_prefix("git@") {
        // git@host:owner/repo
        return rest.contains(':') && rest.split(':').next().map(|h| !h.is_empty()).unwrap_or(false);
    }
    false
}

/// Parses a YAML or JSON document into the canonical spec type and applies
/// every structural/semantic rule in §4.3, returning a `ValidationError`
/// (as an `Error` of kind `Validation`, with `fields`) naming every failure.
pub fn validate(raw: &str, content_type: ContentType) -> Result<ServiceSpecDocument> {
    let doc: ServiceSpecDocument = match content_type {
        ContentType::Yaml => serde_yaml_parse(raw)?,
        ContentType::Json => {
            serde_json::from_str(raw).map_err(|e| Error::validation(format!("invalid JSON: {e}")))?
        }
    };
    check_rules(&doc)?;
    Ok(doc)
}

#[derive(Debug, Clone, Copy)]
pub enum ContentType {
    Yaml,
    Json,
}

#[cfg(feature = "server")]
fn serde_yaml_parse(raw: &str) -> Result<ServiceSpecDocument> {
    serde_yaml::from_str(raw).map_err(|e| Error::validation(format!("invalid YAML: {e}")))
}

#[cfg(not(feature = "server"))]
fn serde_yaml_parse(_raw: &str) -> Result<ServiceSpecDocument> {
    Err(Error::internal("YAML parsing requires the 'server' feature"))
}

/// Checks every rule and accumulates *all* violations rather than
/// short-circuiting on the first, so a client can fix every problem in one
/// round trip.
fn check_rules(doc: &ServiceSpecDocument) -> Result<()> {
    let mut errors = Vec::new();

    if doc.api_version != API_VERSION {
        errors.push(FieldError::new("apiVersion", format!("must be '{API_VERSION}'")));
    }
    if doc.kind != KIND {
        errors.push(FieldError::new("kind", format!("must be '{KIND}'")));
    }
    if !is_valid_dns_label(&doc.metadata.name) {
        errors.push(FieldError::new("metadata.name", "must be a valid DNS label"));
    }

    if !is_valid_git_url(&doc.spec.source.git.repository) {
        errors.push(FieldError::new(
            "spec.source.git.repository",
            "must be an https:// URL to an allow-listed host, or git@host:owner/repo",
        ));
    }
    if doc.spec.source.app_path.is_empty() {
        errors.push(FieldError::new("spec.source.app_path", "must not be empty"));
    }

    if doc.spec.runtime.ports.is_empty() {
        errors.push(FieldError::new("spec.runtime.ports", "at least one port is required"));
    }
    let mut seen_ports = HashSet::new();
    for (i, port) in doc.spec.runtime.ports.iter().enumerate() {
        if *port == 0 {
            errors.push(FieldError::new(
                format!("spec.runtime.ports[{i}]"),
                "must be in 1..65535",
            ));
        }
        if !seen_ports.insert(*port) {
            errors.push(FieldError::new(
                format!("spec.runtime.ports[{i}]"),
                "ports must not overlap within a service",
            ));
        }
    }

    if !doc.spec.runtime.health_check.path.starts_with('/') {
        errors.push(FieldError::new(
            "spec.runtime.healthCheck.path",
            "must begin with '/'",
        ));
    }

    for (i, route) in doc.spec.routes.iter().enumerate() {
        if !is_valid_hostname(&route.host) {
            errors.push(FieldError::new(format!("spec.routes[{i}].host"), "invalid hostname"));
        }
        if route.path != "/*" && !route.path.starts_with('/') {
            errors.push(FieldError::new(
                format!("spec.routes[{i}].path"),
                "must begin with '/' or be '/*'",
            ));
        }
    }

    let declared_env: HashSet<&str> = doc.spec.runtime.env.iter().map(|e| e.name.as_str()).collect();
    let _ = declared_env; // env refs are validated against declared EnvVars at the API layer, which has store access

    if let (Ok(req), Ok(lim)) = (
        parse_millicores(&doc.spec.resources.cpu_request),
        parse_millicores(&doc.spec.resources.cpu_limit),
    ) {
        if req > lim {
            errors.push(FieldError::new(
                "spec.resources.cpu_request",
                "must be <= cpu_limit",
            ));
        }
    } else {
        errors.push(FieldError::new("spec.resources.cpu_request", "invalid CPU quantity"));
    }

    if let (Ok(req), Ok(lim)) = (
        parse_binary_bytes(&doc.spec.resources.memory_request),
        parse_binary_bytes(&doc.spec.resources.memory_limit),
    ) {
        if req > lim {
            errors.push(FieldError::new(
                "spec.resources.memory_request",
                "must be <= memory_limit",
            ));
        }
    } else {
        errors.push(FieldError::new(
            "spec.resources.memory_request",
            "invalid memory quantity",
        ));
    }

    if doc.spec.replicas.min > doc.spec.replicas.max {
        errors.push(FieldError::new("spec.replicas.min", "must be <= replicas.max"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::fields(errors))
    }
}

/// Ensures the project+name uniqueness invariant (§4.3), checked against the
/// store since it can't be known from the document alone.
pub fn field_path_for_duplicate_name() -> &'static str {
    "metadata.name"
}

/// Parses a Kubernetes-style CPU quantity (`"500m"` or `"1"`) into
/// millicores.
fn parse_millicores(s: &str) -> std::result::Result<u64, ()> {
    if let Some(stripped) = s.strip_suffix('m') {
        stripped.parse().map_err(|_| ())
    } else {
        s.parse::<u64>().map(|cores| cores * 1000).map_err(|_| ())
    }
}

/// Parses a binary-unit memory quantity (`"512Mi"`, `"1Gi"`) into bytes.
fn parse_binary_bytes(s: &str) -> std::result::Result<u64, ()> {
    let units: &[(&str, u64)] = &[
        ("Ki", 1024),
        ("Mi", 1024u64.pow(2)),
        ("Gi", 1024u64.pow(3)),
        ("Ti", 1024u64.pow(4)),
    ];
    for (suffix, multiplier) in units {
        if let Some(stripped) = s.strip_suffix(suffix) {
            return stripped.parse::<u64>().map(|n| n * multiplier).map_err(|_| ());
        }
    }
    s.parse::<u64>().map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_label_rules() {
        assert!(is_valid_dns_label("api"));
        assert!(is_valid_dns_label("my-service-2"));
        assert!(!is_valid_dns_label("-leading-hyphen"));
        assert!(!is_valid_dns_label("trailing-hyphen-"));
        assert!(!is_valid_dns_label("Has_Upper"));
        assert!(!is_valid_dns_label(""));
    }

    #[test]
    fn git_url_allowlist() {
        assert!(is_valid_git_url("https://github.com/acme/api"));
        assert!(is_valid_git_url("git@github.com:acme/api.git"));
        assert!(!is_valid_git_url("https://evil.example/acme/api"));
        assert!(!is_valid_git_url("ftp://github.com/acme/api"));
    }

    #[test]
    fn millicores_parsing() {
        assert_eq!(parse_millicores("500m"), Ok(500));
        assert_eq!(parse_millicores("2"), Ok(2000));
        assert!(parse_millicores("bogus").is_err());
    }

    #[test]
    fn binary_bytes_parsing() {
        assert_eq!(parse_binary_bytes("512Mi"), Ok(512 * 1024 * 1024));
        assert_eq!(parse_binary_bytes("1Gi"), Ok(1024 * 1024 * 1024));
    }

    fn sample_doc() -> ServiceSpecDocument {
        use super::super::model::*;
        ServiceSpecDocument {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: Metadata { name: "api".into() },
            spec: ServiceSpec {
                source: Source {
                    git: GitSource {
                        repository: "https://github.com/acme/api".into(),
                        branch: "main".into(),
                    },
                    app_path: "apps/api".into(),
                },
                build: Build {
                    kind: BuildKind::Dockerfile,
                    dockerfile: Some("Dockerfile".into()),
                    build_command: None,
                    start_command: None,
                },
                runtime: Runtime {
                    ports: vec![8080],
                    health_check: HealthCheck {
                        path: "/healthz".into(),
                        port: 8080,
                        period: 10,
                        timeout: 3,
                        threshold: 3,
                    },
                    env: vec![],
                },
                routes: vec![RouteSpec {
                    host: "api.example.com".into(),
                    path: "/".into(),
                    port: 8080,
                }],
                resources: Resources {
                    cpu_request: "250m".into(),
                    cpu_limit: "500m".into(),
                    memory_request: "256Mi".into(),
                    memory_limit: "512Mi".into(),
                },
                replicas: Replicas::default(),
                volumes: vec![],
            },
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(check_rules(&sample_doc()).is_ok());
    }

    #[test]
    fn overlapping_ports_rejected() {
        let mut doc = sample_doc();
        doc.spec.runtime.ports = vec![8080, 8080];
        let err = check_rules(&doc).unwrap_err();
        assert!(err.fields.iter().any(|f| f.path.contains("ports")));
    }

    #[test]
    fn health_check_path_must_start_with_slash() {
        let mut doc = sample_doc();
        doc.spec.runtime.health_check.path = "healthz".into();
        assert!(check_rules(&doc).is_err());
    }

    #[test]
    fn resource_request_above_limit_rejected() {
        let mut doc = sample_doc();
        doc.spec.resources.cpu_request = "600m".into();
        doc.spec.resources.cpu_limit = "500m".into();
        assert!(check_rules(&doc).is_err());
    }

    #[test]
    fn canonicalize_then_revalidate_is_a_fixed_point() {
        let doc = sample_doc();
        let json = serde_json::to_string(&doc).unwrap();
        let reparsed: ServiceSpecDocument = serde_json::from_str(&json).unwrap();
        assert!(check_rules(&reparsed).is_ok());
        let json2 = serde_json::to_string(&reparsed).unwrap();
        assert_eq!(json, json2);
    }
}

//! Detection rules (§4.4), applied per candidate directory in descending
//! confidence order: Dockerfile, then package.json, then Python manifests,
//! then go.mod.

use super::RemoteTreeEntry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Container,
    Node,
    Python,
    Go,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Next,
    Express,
    Fastapi,
    Flask,
    Django,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DetectedService {
    pub name: String,
    pub app_path: String,
    pub runtime: Runtime,
    pub framework: Option<Framework>,
    pub port: Option<u16>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub confidence: f32,
    pub notes: Vec<String>,
}

/// Walks `entries` and returns candidate services ordered by descending
/// confidence, scoped to `subpath` when given.
pub fn detect_services(entries: &[RemoteTreeEntry], subpath: Option<&str>) -> Vec<DetectedService> {
    let scoped: Vec<&RemoteTreeEntry> = match subpath {
        Some(p) => entries
            .iter()
            .filter(|e| e.path == p || e.path.starts_with(&format!("{p}/")))
            .collect(),
        None => entries.iter().collect(),
    };

    let by_dir = group_by_directory(&scoped);

    let monorepo_tool = super::detect_monorepo_tool(entries);
    let candidate_dirs: Vec<&str> = if let Some(tool) = monorepo_tool {
        let mut dirs: Vec<&str> = by_dir
            .keys()
            .filter(|d| {
                d.is_empty()
                    || tool
                        .candidate_roots()
                        .iter()
                        .any(|root| d.starts_with(&format!("{root}/")) || *d == *root)
            })
            .map(|d| d.as_str())
            .collect();
        dirs.sort();
        dirs
    } else {
        by_dir.keys().map(|d| d.as_str()).collect()
    };

    let mut found = Vec::new();
    for dir in candidate_dirs {
        let files = &by_dir[dir];
        if let Some(svc) = detect_in_directory(dir, files) {
            found.push(svc);
        }
    }

    found.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    found
}

fn group_by_directory<'a>(
    entries: &[&'a RemoteTreeEntry],
) -> BTreeMap<String, Vec<&'a RemoteTreeEntry>> {
    let mut map: BTreeMap<String, Vec<&RemoteTreeEntry>> = BTreeMap::new();
    for e in entries {
        if e.is_dir {
            continue;
        }
        map.entry(e.dir_of().to_string()).or_default().push(e);
    }
    map
}

fn find<'a>(files: &[&'a RemoteTreeEntry], name: &str) -> Option<&'a RemoteTreeEntry> {
    files.iter().find(|f| f.basename() == name).copied()
}

fn service_name(dir: &str) -> String {
    if dir.is_empty() {
        "root".to_string()
    } else {
        dir.rsplit('/').next().unwrap_or(dir).to_string()
    }
}

fn detect_in_directory(dir: &str, files: &[&RemoteTreeEntry]) -> Option<DetectedService> {
    if let Some(dockerfile) = find(files, "Dockerfile") {
        return Some(detect_dockerfile(dir, dockerfile));
    }
    if let Some(pkg) = find(files, "package.json") {
        return Some(detect_node(dir, pkg));
    }
    if let Some(manifest) = find(files, "pyproject.toml").or_else(|| find(files, "requirements.txt")) {
        return Some(detect_python(dir, manifest));
    }
    if find(files, "go.mod").is_some() {
        return Some(detect_go(dir));
    }
    None
}

/// Rule 1: Dockerfile present, confidence 0.95. `EXPOSE`/`CMD` are parsed
/// out of the blob content when it was fetched alongside the tree listing.
fn detect_dockerfile(dir: &str, dockerfile: &RemoteTreeEntry) -> DetectedService {
    let mut port = None;
    let mut start_command = None;
    let mut notes = Vec::new();

    if let Some(content) = &dockerfile.content {
        for line in content.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("EXPOSE ") {
                port = rest.split_whitespace().next().and_then(|p| p.parse().ok());
            }
            if let Some(rest) = line.strip_prefix("CMD ") {
                start_command = Some(parse_shell_form(rest));
            }
        }
    } else {
        notes.push("Dockerfile content unavailable; EXPOSE/CMD not parsed".to_string());
    }

    DetectedService {
        name: service_name(dir),
        app_path: dir.to_string(),
        runtime: Runtime::Container,
        framework: None,
        port,
        build_command: None,
        start_command,
        confidence: 0.95,
        notes,
    }
}

/// A Dockerfile `CMD` can be shell form (`CMD npm start`) or exec-array form
/// (`CMD ["npm", "start"]`); both are normalized to a shell command string.
fn parse_shell_form(rest: &str) -> String {
    let rest = rest.trim();
    if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        inner
            .split(',')
            .map(|s| s.trim().trim_matches('"'))
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        rest.to_string()
    }
}

/// Rule 2: `package.json` with a recognized framework dependency.
fn detect_node(dir: &str, pkg: &RemoteTreeEntry) -> DetectedService {
    let mut framework = None;
    let mut port = Some(8080u16);
    let mut notes = Vec::new();

    if let Some(content) = &pkg.content {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(content) {
            let deps = json.get("dependencies").and_then(|d| d.as_object());
            if let Some(deps) = deps {
                if deps.contains_key("next") {
                    framework = Some(Framework::Next);
                    port = Some(3000);
                } else if deps.contains_key("express") {
                    framework = Some(Framework::Express);
                }
            }
        } else {
            notes.push("package.json was not valid JSON".to_string());
        }
    } else {
        notes.push("package.json content unavailable; framework not detected".to_string());
    }

    DetectedService {
        name: service_name(dir),
        app_path: dir.to_string(),
        runtime: Runtime::Node,
        framework,
        port,
        build_command: Some("npm run build".to_string()),
        start_command: Some("npm start".to_string()),
        confidence: 0.8,
        notes,
    }
}

/// Rule 3: `pyproject.toml` or `requirements.txt` with an ASGI/WSGI server
/// dependency.
fn detect_python(dir: &str, manifest: &RemoteTreeEntry) -> DetectedService {
    let mut framework = None;
    let mut notes = Vec::new();

    if let Some(content) = &manifest.content {
        let lower = content.to_lowercase();
        if lower.contains("fastapi") {
            framework = Some(Framework::Fastapi);
        } else if lower.contains("django") {
            framework = Some(Framework::Django);
        } else if lower.contains("flask") {
            framework = Some(Framework::Flask);
        }
    } else {
        notes.push("manifest content unavailable; framework not detected".to_string());
    }

    let (port, start_command) = match framework {
        Some(Framework::Fastapi) => (Some(8000), Some("uvicorn main:app --host 0.0.0.0".to_string())),
        Some(Framework::Django) => (Some(8000), Some("gunicorn wsgi:application".to_string())),
        Some(Framework::Flask) => (Some(5000), Some("gunicorn app:app".to_string())),
        _ => (Some(8000), None),
    };

    DetectedService {
        name: service_name(dir),
        app_path: dir.to_string(),
        runtime: Runtime::Python,
        framework,
        port,
        build_command: None,
        start_command,
        confidence: 0.7,
        notes,
    }
}

/// Rule 4: `go.mod` present.
fn detect_go(dir: &str) -> DetectedService {
    DetectedService {
        name: service_name(dir),
        app_path: dir.to_string(),
        runtime: Runtime::Go,
        framework: None,
        port: Some(8080),
        build_command: Some("go build -o app ./...".to_string()),
        start_command: Some("./app".to_string()),
        confidence: 0.6,
        notes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dockerfile_with_expose_and_cmd() {
        let entries = vec![RemoteTreeEntry::file_with_content(
            "Dockerfile",
            "FROM node:20\nEXPOSE 3000\nCMD [\"node\", \"server.js\"]\n",
        )];
        let found = detect_services(&entries, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].runtime, Runtime::Container);
        assert_eq!(found[0].port, Some(3000));
        assert_eq!(found[0].start_command.as_deref(), Some("node server.js"));
        assert!((found[0].confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn detects_next_app_from_package_json() {
        let entries = vec![RemoteTreeEntry::file_with_content(
            "apps/web/package.json",
            r#"{"dependencies": {"next": "14.0.0", "react": "18.0.0"}}"#,
        )];
        let found = detect_services(&entries, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].framework, Some(Framework::Next));
        assert_eq!(found[0].port, Some(3000));
    }

    #[test]
    fn dockerfile_takes_precedence_over_package_json_in_same_directory() {
        let entries = vec![
            RemoteTreeEntry::file("Dockerfile"),
            RemoteTreeEntry::file("package.json"),
        ];
        let found = detect_services(&entries, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].runtime, Runtime::Container);
    }

    #[test]
    fn go_mod_detected_with_defaults() {
        let entries = vec![RemoteTreeEntry::file("services/worker/go.mod")];
        let found = detect_services(&entries, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].runtime, Runtime::Go);
        assert_eq!(found[0].start_command.as_deref(), Some("./app"));
    }

    #[test]
    fn monorepo_restricts_to_candidate_roots() {
        let entries = vec![
            RemoteTreeEntry::file("turbo.json"),
            RemoteTreeEntry::file("apps/api/package.json"),
            RemoteTreeEntry::file("tools/scripts/package.json"),
        ];
        let found = detect_services(&entries, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].app_path, "apps/api");
    }

    #[test]
    fn shared_directories_are_reported_separately() {
        let entries = vec![
            RemoteTreeEntry::dir("packages"),
            RemoteTreeEntry::file("packages/ui/index.ts"),
            RemoteTreeEntry::file("apps/api/package.json"),
        ];
        let shared = super::super::shared_directories(&entries);
        assert_eq!(shared, vec!["packages".to_string()]);
    }

    #[test]
    fn results_ordered_by_descending_confidence() {
        let entries = vec![
            RemoteTreeEntry::file("svc-go/go.mod"),
            RemoteTreeEntry::file("svc-docker/Dockerfile"),
        ];
        let found = detect_services(&entries, None);
        assert_eq!(found.len(), 2);
        assert!(found[0].confidence >= found[1].confidence);
        assert_eq!(found[0].runtime, Runtime::Container);
    }
}

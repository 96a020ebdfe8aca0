//! Shared fixtures for the cluster and isolation tests.
//!
//! - a fake distribution whose launcher is a shell script
//! - an in-process fake search server speaking just enough HTTP/1.1

#![allow(dead_code)]

use elastictest::{ClusterSettings, Distribution, PortAllocator, PortPair, StartupPolicy};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

static TRACING: Once = Once::new();

pub fn init_test_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Launcher that stays up until signalled.
pub const SLEEPER: &str = "#!/bin/sh\nexec sleep 60\n";

/// Launcher that leaves a copy of its settings file at `copy`, then stays up.
pub fn settings_copying_launcher(copy: &Path) -> String {
    format!("#!/bin/sh\ncp \"${{2#-Des.config=}}\" \"{}\"\nexec sleep 60\n", copy.display())
}

/// Writes a distribution whose `bin/elasticsearch` is `launcher`.
#[cfg(unix)]
pub fn fake_distribution(temp: &TempDir, launcher: &str) -> Distribution {
    use std::os::unix::fs::PermissionsExt;

    let install = temp.path().join("dist");
    fs::create_dir_all(install.join("bin")).unwrap();
    fs::create_dir_all(install.join("lib")).unwrap();

    let executable = install.join("bin/elasticsearch");
    fs::write(&executable, launcher).unwrap();
    fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(install.join("bin/elasticsearch.in.sh"), "# include\n").unwrap();

    Distribution::new(install).unwrap()
}

/// Polling fast enough for tests.
pub fn fast_startup(timeout: Duration) -> StartupPolicy {
    StartupPolicy {
        timeout,
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(50),
        request_timeout: Duration::from_millis(500),
    }
}

/// Settings for `size` nodes where node 0's client port is `server`.
pub fn settings_fronted_by(
    distribution: Distribution,
    server: &FakeSearchServer,
    size: usize,
    timeout: Duration,
) -> ClusterSettings {
    // The fake already holds its port, so only the rest come from the OS
    let free = PortAllocator::default().allocate(size * 2 - 1).unwrap();
    let mut ports = vec![PortPair::new(server.port(), free[0])];
    ports.extend(
        free[1..]
            .chunks_exact(2)
            .map(|pair| PortPair::new(pair[0], pair[1])),
    );

    ClusterSettings::new(distribution)
        .with_size(size)
        .with_ports(ports)
        .with_startup(fast_startup(timeout))
}

/// Mutable state behind a [`FakeSearchServer`].
#[derive(Debug)]
pub struct FakeState {
    pub cluster_name: String,
    pub status: String,
    pub number_of_nodes: usize,
    pub templates: BTreeMap<String, Value>,
    pub indices: BTreeSet<String>,
    pub reject_template_deletes: bool,
    pub requests: Vec<String>,
    /// When set, health reports the `cluster.name` found in this settings file.
    pub name_from_settings: Option<PathBuf>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            cluster_name: "unnamed".to_string(),
            status: "green".to_string(),
            number_of_nodes: 1,
            templates: BTreeMap::new(),
            indices: BTreeSet::new(),
            reject_template_deletes: false,
            requests: Vec::new(),
            name_from_settings: None,
        }
    }
}

/// Answers the health, state, template and index calls from memory.
pub struct FakeSearchServer {
    port: u16,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSearchServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(FakeState::default()));

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, &shared);
            }
        });

        Self { port, state }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_health(&self, cluster_name: &str, status: &str, number_of_nodes: usize) {
        self.with_state(|state| {
            state.cluster_name = cluster_name.to_string();
            state.status = status.to_string();
            state.number_of_nodes = number_of_nodes;
        });
    }

    pub fn template_names(&self) -> BTreeSet<String> {
        self.with_state(|state| state.templates.keys().cloned().collect())
    }

    pub fn indices(&self) -> BTreeSet<String> {
        self.with_state(|state| state.indices.clone())
    }

    pub fn requests(&self) -> Vec<String> {
        self.with_state(|state| state.requests.clone())
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<FakeState>) {
    let Some((method, path, body)) = read_request(&stream) else {
        return;
    };

    let (status, response) = {
        let mut state = state.lock().unwrap();
        state.requests.push(format!("{method} {path}"));
        route(&mut state, &method, &path, &body)
    };

    let response = response.to_string();
    let reply = format!(
        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response}",
        response.len()
    );
    let _ = stream.write_all(reply.as_bytes());
}

fn read_request(stream: &TcpStream) -> Option<(String, String, String)> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        if header.trim().is_empty() {
            break;
        }
        if let Some(value) = header.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().ok()?;
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some((method, path, String::from_utf8_lossy(&body).into_owned()))
}

fn route(state: &mut FakeState, method: &str, path: &str, body: &str) -> (u16, Value) {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let ack = json!({ "acknowledged": true });

    match (method, segments.as_slice()) {
        ("GET", ["_cluster", "health"]) => {
            let cluster_name = match &state.name_from_settings {
                Some(file) => cluster_name_in(file).unwrap_or_else(|| "unknown".to_string()),
                None => state.cluster_name.clone(),
            };
            (
                200,
                json!({
                    "status": state.status,
                    "cluster_name": cluster_name,
                    "number_of_nodes": state.number_of_nodes,
                }),
            )
        }
        ("GET", ["_cluster", "state"]) => (
            200,
            json!({
                "cluster_name": state.cluster_name,
                "metadata": { "templates": state.templates },
            }),
        ),
        ("PUT", ["_template", name]) => {
            let definition = serde_json::from_str(body).unwrap_or(Value::Null);
            state.templates.insert((*name).to_string(), definition);
            (200, ack)
        }
        ("GET", ["_template", name]) => match state.templates.get(*name) {
            Some(definition) => {
                let mut found = serde_json::Map::new();
                found.insert((*name).to_string(), definition.clone());
                (200, Value::Object(found))
            }
            None => (404, json!({})),
        },
        ("DELETE", ["_template", name]) => {
            if state.reject_template_deletes {
                (500, json!({ "error": "template deletes disabled" }))
            } else if state.templates.remove(*name).is_some() {
                (200, ack)
            } else {
                (404, json!({ "error": "missing" }))
            }
        }
        ("DELETE", ["_all"]) => {
            state.indices.clear();
            (200, ack)
        }
        ("POST", ["_refresh"]) => (200, json!({ "ok": true })),
        ("GET", ["_status"]) => {
            let indices: serde_json::Map<String, Value> = state
                .indices
                .iter()
                .map(|name| (name.clone(), json!({})))
                .collect();
            (200, json!({ "ok": true, "indices": indices }))
        }
        ("PUT", [index]) => {
            if state.indices.insert((*index).to_string()) {
                (200, ack)
            } else {
                (400, json!({ "error": "IndexAlreadyExistsException" }))
            }
        }
        ("DELETE", [index]) => {
            if state.indices.remove(*index) {
                (200, ack)
            } else {
                (404, json!({ "error": "IndexMissingException" }))
            }
        }
        ("POST", [index, _doc_type]) => {
            state.indices.insert((*index).to_string());
            (201, json!({ "ok": true, "_index": index, "_id": "1" }))
        }
        _ => (404, json!({ "error": "no handler" })),
    }
}

fn cluster_name_in(settings_file: &Path) -> Option<String> {
    let content = fs::read_to_string(settings_file).ok()?;
    let quoted = content
        .lines()
        .find_map(|line| line.strip_prefix("cluster.name: "))?;
    serde_json::from_str(quoted).ok()
}

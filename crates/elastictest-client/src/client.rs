//! Blocking HTTP client that rotates across the nodes of one cluster.

use crate::{ClientError, ClientResult, ClusterStateFilter, Health, HealthQuery};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Client bound to every node URL of a cluster.
///
/// Requests start at the next node in round-robin order. A transport
/// failure (refused, reset, timed out) moves on to the following node, up
/// to `max_retries` extra attempts. HTTP error statuses are returned as-is
/// without trying another node.
#[derive(Debug, Clone)]
pub struct Client {
    agent: ureq::Agent,
    urls: Vec<String>,
    max_retries: usize,
    next: Arc<AtomicUsize>,
}

impl Client {
    /// Creates a client for the given base URLs (`http://host:port`).
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls = urls
            .into_iter()
            .map(|url| {
                let url: String = url.into();
                url.trim_end_matches('/').to_string()
            })
            .collect();

        Self {
            agent: build_agent(DEFAULT_REQUEST_TIMEOUT),
            urls,
            max_retries: 0,
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets how many other nodes to try after a transport failure.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    // ------------------------------------------------------------------
    // Cluster
    // ------------------------------------------------------------------

    /// `GET /_cluster/health`.
    pub fn health(&self, query: &HealthQuery) -> ClientResult<Health> {
        let url_hint = "_cluster/health";
        let value = self.send("GET", url_hint, &query.query_pairs(), None)?;
        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            url: url_hint.to_string(),
            source,
        })
    }

    /// `GET /_cluster/state`, minus the sections the filter excludes.
    pub fn cluster_state(&self, filter: &ClusterStateFilter) -> ClientResult<Value> {
        self.send("GET", "_cluster/state", &filter.query_pairs(), None)
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Every index template on the cluster, keyed by name.
    pub fn list_templates(&self) -> ClientResult<BTreeMap<String, Value>> {
        let state = self.cluster_state(&ClusterStateFilter::metadata_only())?;
        let templates = match state.pointer("/metadata/templates") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, body)| (name.clone(), body.clone()))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(templates)
    }

    /// `PUT /_template/{name}`.
    pub fn create_template(&self, name: &str, settings: &Value) -> ClientResult<Value> {
        self.send("PUT", &format!("_template/{}", segment(name)), &[], Some(settings))
    }

    /// `GET /_template/{name}`. A missing template yields an empty object.
    pub fn get_template(&self, name: &str) -> ClientResult<Value> {
        match self.send("GET", &format!("_template/{}", segment(name)), &[], None) {
            Err(ClientError::Http { status: 404, .. }) => Ok(Value::Object(Default::default())),
            other => other,
        }
    }

    /// `DELETE /_template/{name}`.
    pub fn delete_template(&self, name: &str) -> ClientResult<Value> {
        self.send("DELETE", &format!("_template/{}", segment(name)), &[], None)
    }

    // ------------------------------------------------------------------
    // Indices
    // ------------------------------------------------------------------

    /// `PUT /{index}`.
    pub fn create_index(&self, index: &str) -> ClientResult<Value> {
        self.send("PUT", &segment(index), &[], None)
    }

    /// `DELETE /{index}`.
    pub fn delete_index(&self, index: &str) -> ClientResult<Value> {
        self.send("DELETE", &segment(index), &[], None)
    }

    /// `DELETE /_all`.
    pub fn delete_all_indexes(&self) -> ClientResult<Value> {
        self.send("DELETE", "_all", &[], None)
    }

    /// `POST /{index}/{doc_type}` with an auto-generated id.
    pub fn index(&self, index: &str, doc_type: &str, document: &Value) -> ClientResult<Value> {
        let path = format!("{}/{}", segment(index), segment(doc_type));
        self.send("POST", &path, &[], Some(document))
    }

    /// `POST /_refresh`.
    pub fn refresh(&self) -> ClientResult<Value> {
        self.send("POST", "_refresh", &[], None)
    }

    /// `GET /_status`.
    pub fn status(&self) -> ClientResult<Value> {
        self.send("GET", "_status", &[], None)
    }

    /// Names of all indices currently reported by `_status`.
    pub fn index_names(&self) -> ClientResult<BTreeSet<String>> {
        let status = self.status()?;
        let names = match status.get("indices") {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => BTreeSet::new(),
        };
        Ok(names)
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    fn next_url(&self) -> &str {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.urls.len();
        &self.urls[slot]
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> ClientResult<Value> {
        if self.urls.is_empty() {
            return Err(ClientError::NoServers);
        }

        let mut last_error = None;
        for _ in 0..=self.max_retries {
            let url = format!("{}/{}", self.next_url(), path);
            let mut request = self.agent.request(method, &url);
            for (key, value) in query {
                request = request.query(key, value);
            }

            let outcome = match body {
                Some(body) => request
                    .set("Content-Type", "application/json")
                    .send_string(&body.to_string()),
                None => request.call(),
            };

            match outcome {
                Ok(response) => {
                    let text = response
                        .into_string()
                        .map_err(|source| ClientError::Read {
                            url: url.clone(),
                            source,
                        })?;
                    return decode(&url, &text);
                }
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    return Err(ClientError::Http { status, url, body });
                }
                Err(ureq::Error::Transport(transport)) => {
                    debug!(%method, %url, error = %transport, "request failed, trying next node");
                    // Display of a transport error repeats the url
                    let message = match transport.message() {
                        Some(detail) => format!("{}: {detail}", transport.kind()),
                        None => transport.kind().to_string(),
                    };
                    last_error = Some(ClientError::Transport { url, message });
                }
            }
        }

        Err(last_error.unwrap_or(ClientError::NoServers))
    }
}

/// Percent-encodes a caller-supplied name for use as one path segment.
fn segment(name: &str) -> Cow<'_, str> {
    urlencoding::encode(name)
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout(timeout)
        .build()
}

fn decode(url: &str, text: &str) -> ClientResult<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

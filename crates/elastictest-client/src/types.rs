//! Request parameter sets and response shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse cluster health indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `GET /_cluster/health`.
///
/// Only the fields the harness compares against are decoded; everything
/// else the server reports is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub cluster_name: String,
    pub number_of_nodes: usize,
}

/// Query parameters understood by the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthQuery {
    /// Block server-side until the cluster reaches this status.
    pub wait_for_status: Option<HealthStatus>,
    /// Block server-side until the node count matches, e.g. `">1"` or `"3"`.
    pub wait_for_nodes: Option<String>,
    /// Server-side wait timeout, e.g. `"5s"`.
    pub timeout: Option<String>,
}

impl HealthQuery {
    pub fn wait_for_nodes(expression: impl Into<String>) -> Self {
        Self {
            wait_for_nodes: Some(expression.into()),
            ..Self::default()
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.wait_for_status {
            pairs.push(("wait_for_status", status.as_str().to_string()));
        }
        if let Some(nodes) = &self.wait_for_nodes {
            pairs.push(("wait_for_nodes", nodes.clone()));
        }
        if let Some(timeout) = &self.timeout {
            pairs.push(("timeout", timeout.clone()));
        }
        pairs
    }
}

/// Sections of `GET /_cluster/state` the server should leave out.
///
/// Only flags set to `true` are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStateFilter {
    pub filter_nodes: bool,
    pub filter_routing_table: bool,
    pub filter_metadata: bool,
    pub filter_blocks: bool,
    pub filter_indices: bool,
}

impl ClusterStateFilter {
    /// Everything but the metadata section, which is where templates live.
    pub fn metadata_only() -> Self {
        Self {
            filter_nodes: true,
            filter_routing_table: true,
            filter_blocks: true,
            ..Self::default()
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        [
            ("filter_nodes", self.filter_nodes),
            ("filter_routing_table", self.filter_routing_table),
            ("filter_metadata", self.filter_metadata),
            ("filter_blocks", self.filter_blocks),
            ("filter_indices", self.filter_indices),
        ]
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| (name, "true".to_string()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn health_decodes_and_ignores_extra_fields() {
        let body = r#"{
            "cluster_name": "c0ffee",
            "status": "yellow",
            "timed_out": false,
            "number_of_nodes": 3,
            "number_of_data_nodes": 3,
            "active_shards": 2
        }"#;

        let health: Health = serde_json::from_str(body).unwrap();
        assert_eq!(health.status, HealthStatus::Yellow);
        assert_eq!(health.cluster_name, "c0ffee");
        assert_eq!(health.number_of_nodes, 3);
    }

    #[test]
    fn empty_filter_sends_nothing() {
        assert!(ClusterStateFilter::default().query_pairs().is_empty());
    }

    #[test]
    fn metadata_only_filter_sends_set_flags() {
        let pairs = ClusterStateFilter::metadata_only().query_pairs();
        let names: Vec<_> = pairs.iter().map(|(name, _)| *name).collect();

        assert_eq!(
            names,
            vec!["filter_nodes", "filter_routing_table", "filter_blocks"]
        );
        assert!(pairs.iter().all(|(_, value)| value == "true"));
    }

    #[test_case(HealthStatus::Green, "green")]
    #[test_case(HealthStatus::Yellow, "yellow")]
    #[test_case(HealthStatus::Red, "red")]
    fn wait_for_status_is_lowercase(status: HealthStatus, expected: &str) {
        let query = HealthQuery {
            wait_for_status: Some(status),
            ..HealthQuery::default()
        };
        assert_eq!(
            query.query_pairs(),
            vec![("wait_for_status", expected.to_string())]
        );
    }

    #[test]
    fn wait_for_nodes_shorthand() {
        let query = HealthQuery::wait_for_nodes(">1");
        assert_eq!(query.query_pairs(), vec![("wait_for_nodes", ">1".to_string())]);
    }
}

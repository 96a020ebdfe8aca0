//! HTTP client for the search-server calls the elastictest harness relies on.
//!
//! This is deliberately narrow: cluster health and state, index templates,
//! and index create/delete/status. Everything is blocking; callers running
//! inside an async runtime should hop onto a blocking task first.
//!
//! ```ignore
//! use elastictest_client::{Client, HealthQuery};
//!
//! let client = Client::new(["http://127.0.0.1:9200"]).with_max_retries(2);
//! let health = client.health(&HealthQuery::default())?;
//! println!("{} is {}", health.cluster_name, health.status);
//! ```

mod client;
mod error;
mod types;

pub use client::{Client, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ClientError, ClientResult};
pub use types::{ClusterStateFilter, Health, HealthQuery, HealthStatus};

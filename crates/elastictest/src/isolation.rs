//! Per-test isolation on a reused cluster.
//!
//! A scope remembers which templates existed when it was entered. Leaving
//! it deletes every template created since and every index, whatever the
//! test did. Cluster-wide settings and pre-existing index contents are not
//! snapshotted: indexes are always wiped, templates are restored by name.

use crate::{Cluster, Error, Result};
use elastictest_client::{Client, ClientError, ClientResult};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Names of the templates present at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet(BTreeSet<String>);

impl TemplateSet {
    /// Reads the current template names from the cluster.
    pub fn capture(client: &Client) -> ClientResult<Self> {
        Ok(client.list_templates()?.into_keys().collect())
    }

    /// Names present in `self` but not in `earlier`.
    pub fn added_since<'a>(&'a self, earlier: &'a TemplateSet) -> impl Iterator<Item = &'a str> {
        self.0.difference(&earlier.0).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for TemplateSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Guard that undoes a test's templates and data when it ends.
///
/// Prefer [`IsolationScope::exit`], which reports failures. A scope that is
/// simply dropped (early return, panic) still cleans up, but can only log
/// what went wrong.
///
/// All calls block on HTTP.
#[derive(Debug)]
pub struct IsolationScope<'a> {
    client: &'a Client,
    prior: TemplateSet,
    active: bool,
}

impl<'a> IsolationScope<'a> {
    /// Snapshots the templates of a started cluster.
    pub fn enter(cluster: &'a Cluster) -> Result<Self> {
        let client = cluster
            .client()
            .ok_or_else(|| Error::NotStarted(cluster.name().to_string()))?;
        Self::with_client(client)
    }

    /// Snapshots the templates reachable through `client`.
    pub fn with_client(client: &'a Client) -> Result<Self> {
        let prior = TemplateSet::capture(client).map_err(|source| Error::Isolation {
            action: "snapshot templates".to_string(),
            source,
        })?;
        debug!(templates = prior.len(), "isolation scope entered");

        Ok(Self {
            client,
            prior,
            active: true,
        })
    }

    pub fn client(&self) -> &'a Client {
        self.client
    }

    /// Templates that existed on entry.
    pub fn prior_templates(&self) -> &TemplateSet {
        &self.prior
    }

    /// Deletes templates created inside the scope, then every index.
    ///
    /// Keeps going after a failed delete so the indexes are always wiped;
    /// the first failure is returned.
    pub fn exit(mut self) -> Result<()> {
        self.active = false;
        self.restore()
    }

    fn restore(&self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        let mut record = |action: String, source: ClientError| {
            warn!(%action, error = %source, "isolation teardown step failed");
            first_error.get_or_insert(Error::Isolation { action, source });
        };

        match TemplateSet::capture(self.client) {
            Ok(current) => {
                for name in current.added_since(&self.prior) {
                    debug!(template = name, "deleting template created in scope");
                    if let Err(e) = self.client.delete_template(name) {
                        record(format!("delete template {name}"), e);
                    }
                }
            }
            Err(e) => record("list templates".to_string(), e),
        }

        if let Err(e) = self.client.delete_all_indexes() {
            record("delete all indexes".to_string(), e);
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for IsolationScope<'_> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(e) = self.restore() {
                error!(error = %e, "isolation scope left the cluster dirty");
            }
        }
    }
}

/// Runs `body` inside an [`IsolationScope`] on `cluster`.
///
/// Teardown runs on every exit path. If `body` panics the panic is resumed
/// after cleanup; otherwise a teardown failure is returned in place of the
/// body's value.
pub fn isolated<T>(cluster: &Cluster, body: impl FnOnce(&Client) -> T) -> Result<T> {
    let scope = IsolationScope::enter(cluster)?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(scope.client())));
    let restored = scope.exit();

    match outcome {
        Ok(value) => restored.map(|()| value),
        Err(payload) => panic::resume_unwind(payload),
    }
}

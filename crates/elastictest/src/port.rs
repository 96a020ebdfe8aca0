//! Free local port discovery.
//!
//! Ports come from the OS: bind an ephemeral listener, read back the port,
//! release it. Every listener of one `allocate` call stays open until the
//! whole batch is collected, so a single call never hands out a duplicate.
//! Nothing stops another process from grabbing a port between allocation
//! and the node binding it; that shows up as a node start failure.

use crate::{Error, Result};
use std::net::TcpListener;

pub use elastictest_config::PortPair;

/// Extra bind attempts tolerated per allocation call before giving up.
const MAX_EXTRA_ATTEMPTS: usize = 8;

/// Hands out free TCP ports on one local address.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    host: String,
}

impl PortAllocator {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns `count` distinct free ports.
    pub fn allocate(&self, count: usize) -> Result<Vec<u16>> {
        let mut listeners = Vec::with_capacity(count);
        let mut ports = Vec::with_capacity(count);
        let mut failures = 0;
        let mut last_error = None;

        while ports.len() < count {
            if failures > MAX_EXTRA_ATTEMPTS {
                return Err(Error::Allocation {
                    host: self.host.clone(),
                    reason: last_error
                        .map_or_else(|| "too many attempts".to_string(), |e: std::io::Error| e.to_string()),
                });
            }

            let bound = TcpListener::bind((self.host.as_str(), 0))
                .and_then(|listener| Ok((listener.local_addr()?.port(), listener)));

            match bound {
                Ok((port, listener)) if !ports.contains(&port) => {
                    ports.push(port);
                    listeners.push(listener);
                }
                Ok(_) => failures += 1,
                Err(e) => {
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        drop(listeners);
        Ok(ports)
    }

    /// Resolves the port pairs of a `size`-node cluster.
    ///
    /// Explicit pairs are only checked against `size`. Otherwise client and
    /// transport ports are allocated independently in one batch.
    pub fn resolve(&self, size: usize, explicit: Option<&[PortPair]>) -> Result<Vec<PortPair>> {
        if size == 0 {
            return Err(Error::InvalidNodeCount(size));
        }

        if let Some(pairs) = explicit {
            if pairs.len() != size {
                return Err(Error::PortCountMismatch {
                    expected: size,
                    actual: pairs.len(),
                });
            }
            return Ok(pairs.to_vec());
        }

        let ports = self.allocate(size * 2)?;
        Ok(ports
            .chunks_exact(2)
            .map(|pair| PortPair::new(pair[0], pair[1]))
            .collect())
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client was built without any node URLs.
    #[error("no node URLs configured")]
    NoServers,

    /// Connection refused, reset, timed out or otherwise failed below HTTP.
    #[error("transport error talking to {url}: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// The response body could not be read.
    #[error("failed to read response from {url}: {source}")]
    Read {
        url: String,
        source: std::io::Error,
    },

    /// The response body was not the JSON we expected.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Returns true for failures that are expected while a cluster is still
    /// coming up: refused connections and HTTP-level errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Http { .. } | Self::Read { .. } => true,
            Self::NoServers | Self::Decode { .. } => false,
        }
    }

    /// Returns the HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_http_errors_are_transient() {
        let transport = ClientError::Transport {
            url: "http://127.0.0.1:1".to_string(),
            message: "connection refused".to_string(),
        };
        let http = ClientError::Http {
            status: 503,
            url: "http://127.0.0.1:1/_cluster/health".to_string(),
            body: String::new(),
        };

        assert!(transport.is_transient());
        assert!(http.is_transient());
        assert_eq!(http.status(), Some(503));
        assert_eq!(transport.status(), None);
    }

    #[test]
    fn configuration_errors_are_not_transient() {
        assert!(!ClientError::NoServers.is_transient());
    }
}

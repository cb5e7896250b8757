//! Consul client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Consul HTTP API
#[derive(Debug, Error)]
pub enum ConsulError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Consul returned a non-success status
    #[error("Consul API error: {status} - {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the agent
        body: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token rejected (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ConsulError {
    /// Whether this error is the typed "not found" answer.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Timeouts, refused connections and DNS failures.
    ///
    /// The catalog watch loop retries these without logging since the agent
    /// is expected to come and go.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_typed() {
        assert!(ConsulError::NotFound("config/service-defaults/web".into()).is_not_found());
        let api = ConsulError::Api { status: 500, body: "Unexpected response code: 404".into() };
        assert!(!api.is_not_found(), "a 500 whose body mentions 404 is not a not-found");
    }

    #[test]
    fn test_only_http_errors_are_transient() {
        assert!(!ConsulError::Authentication("ACL not found".into()).is_transient());
        assert!(!ConsulError::Api { status: 503, body: "No cluster leader".into() }.is_transient());
    }
}

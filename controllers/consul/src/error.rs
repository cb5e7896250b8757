//! Controller-specific error types.
//!
//! Wraps the client, CRD and Kubernetes errors the reconcilers propagate, plus
//! the handful of failures that only exist at the controller level.

use consul_client::ConsulError;
use crds::CrdError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Consul controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Consul API error
    #[error("Consul error: {0}")]
    Consul(#[from] ConsulError),

    /// A resource could not be converted to its Consul form
    #[error("Invalid resource: {0}")]
    Crd(#[from] CrdError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reconciliation failed for a reason already written to the resource status
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Several independent steps failed
    #[error("{}", join_messages(.0))]
    MultiError(Vec<ControllerError>),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Listener or socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Collapse a list of failures: none is `None`, one is itself, more is a
    /// [`ControllerError::MultiError`].
    pub fn join(mut errors: Vec<ControllerError>) -> Option<ControllerError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::MultiError(errors)),
        }
    }
}

fn join_messages(errors: &[ControllerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_empty_is_none() {
        assert!(ControllerError::join(Vec::new()).is_none());
    }

    #[test]
    fn test_join_single_is_unwrapped() {
        let err = ControllerError::join(vec![ControllerError::Watch("gone".into())]).unwrap();
        assert!(matches!(err, ControllerError::Watch(_)));
    }

    #[test]
    fn test_join_many_lists_every_message() {
        let err = ControllerError::join(vec![
            ControllerError::Reconciliation("terminating gateway role not found for \"tgw-a\"".into()),
            ControllerError::Reconciliation("error updating role \"tgw-b-acl-role\"".into()),
        ])
        .unwrap();
        let message = err.to_string();
        assert!(message.contains("tgw-a"));
        assert!(message.contains("tgw-b-acl-role"));
        assert!(message.contains("; "));
    }
}

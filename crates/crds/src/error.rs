//! CRD conversion and validation errors

use thiserror::Error;

/// Errors raised while converting custom resources to their Consul form.
#[derive(Debug, Error)]
pub enum CrdError {
    /// Spec could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Spec has a shape Consul cannot accept
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// Unparseable duration string
    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    /// Health check interval missing or invalid
    #[error("invalid value for IntervalDuration: {0:?}")]
    InvalidInterval(String),

    /// Health check timeout invalid
    #[error("invalid value for TimeoutDuration: {0:?}")]
    InvalidTimeout(String),

    /// Health check deregister-after invalid
    #[error("invalid value for DeregisterCriticalServiceAfterDuration: {0:?}")]
    InvalidDeregisterAfter(String),
}

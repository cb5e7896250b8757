//! Controller configuration.
//!
//! Read once at startup from the environment. Tests go through
//! [`ControllerConfig::from_lookup`] with a map instead of the process
//! environment.

use crate::error::ControllerError;
use consul_client::NamespaceMapping;
use consul_client::namespaces::DEFAULT_NAMESPACE;
use std::net::SocketAddr;

const DEFAULT_CONSUL_ADDR: &str = "http://localhost:8500";
const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8080";

/// Settings for one controller process.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Consul HTTP address
    pub consul_address: String,
    /// ACL token; ACL linkage is enabled when present
    pub consul_token: Option<String>,
    /// Datacenter this controller owns entries in
    pub datacenter: String,
    /// Admin partition, empty when partitions are off
    pub partition: String,
    /// Kubernetes to Consul namespace mapping
    pub namespaces: NamespaceMapping,
    /// Default policy for Consul namespaces the controller creates
    pub cross_namespace_acl_policy: String,
    /// Restrict config-entry watches to one Kubernetes namespace
    pub watch_namespace: Option<String>,
    /// Listener for `/healthz`, `/readyz` and `/metrics`
    pub probe_addr: SocketAddr,
}

impl ControllerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let datacenter = var("CONSUL_DATACENTER").ok_or_else(|| {
            ControllerError::InvalidConfig(
                "CONSUL_DATACENTER environment variable is required".to_string(),
            )
        })?;

        let consul_token = match var("CONSUL_HTTP_TOKEN") {
            Some(token) => Some(token),
            None => match var("CONSUL_HTTP_TOKEN_FILE") {
                Some(path) => {
                    let token = std::fs::read_to_string(&path).map_err(|e| {
                        ControllerError::InvalidConfig(format!(
                            "reading CONSUL_HTTP_TOKEN_FILE {path}: {e}"
                        ))
                    })?;
                    Some(token.trim().to_string()).filter(|t| !t.is_empty())
                }
                None => None,
            },
        };

        let probe_addr = var("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {e}")))?;

        Ok(Self {
            consul_address: var("CONSUL_HTTP_ADDR")
                .unwrap_or_else(|| DEFAULT_CONSUL_ADDR.to_string()),
            consul_token,
            datacenter,
            partition: var("CONSUL_PARTITION").unwrap_or_default(),
            namespaces: NamespaceMapping {
                enabled: parse_bool("ENABLE_CONSUL_NAMESPACES", var("ENABLE_CONSUL_NAMESPACES"))?,
                destination_namespace: var("CONSUL_DESTINATION_NAMESPACE")
                    .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                mirroring: parse_bool(
                    "ENABLE_NAMESPACE_MIRRORING",
                    var("ENABLE_NAMESPACE_MIRRORING"),
                )?,
                mirroring_prefix: var("MIRRORING_PREFIX").unwrap_or_default(),
            },
            cross_namespace_acl_policy: var("CROSS_NAMESPACE_ACL_POLICY").unwrap_or_default(),
            watch_namespace: var("WATCH_NAMESPACE"),
            probe_addr,
        })
    }

    /// Whether the controller maintains terminating-gateway ACL links.
    #[must_use]
    pub fn acls_enabled(&self) -> bool {
        self.consul_token.is_some()
    }

    /// Whether an admin partition is configured.
    #[must_use]
    pub fn partitions_enabled(&self) -> bool {
        !self.partition.is_empty()
    }
}

/// Accepts `1`, `t`, `true` and `0`, `f`, `false` in the usual casings; unset is `false`.
fn parse_bool(key: &str, value: Option<String>) -> Result<bool, ControllerError> {
    match value.as_deref().map(str::trim) {
        None => Ok(false),
        Some("1" | "t" | "T" | "true" | "TRUE" | "True") => Ok(true),
        Some("0" | "f" | "F" | "false" | "FALSE" | "False") => Ok(false),
        Some(other) => Err(ControllerError::InvalidConfig(format!(
            "{key}: invalid boolean {other:?}"
        ))),
    }
}

//! ServiceDefaults CRD
//!
//! Default configuration for every instance of one service: protocol, proxy
//! mode and upstream tuning.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use crate::shared::{Expose, MeshGateway, TransparentProxy};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ServiceDefaults",
    namespaced,
    status = "SyncStatus",
    shortname = "service-defaults",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefaultsSpec {
    /// `tcp`, `http`, `http2` or `grpc`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    /// Proxy mode: `direct` or `transparent`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// Transparent proxy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_proxy: Option<TransparentProxy>,

    /// Mesh gateway mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_gateway: Option<MeshGateway>,

    /// Paths exposed without mTLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<Expose>,

    /// SNI used when the service is external to the mesh
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "externalSNI")]
    pub external_sni: String,

    /// Settings applied to this service's upstreams
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_config: Option<Upstreams>,

    /// Destination of a service outside the mesh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ServiceDefaultsDestination>,

    /// Inbound connection limit per instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_inbound_connections: Option<i32>,

    /// Timeout for local connections, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_connect_timeout_ms: Option<i32>,

    /// Timeout for local requests, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_request_timeout_ms: Option<i32>,

    /// Inbound connection balancing, e.g. `exact_balance`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub balance_inbound_connections: String,
}

/// Upstream defaults and per-upstream overrides.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Upstreams {
    /// Applied to every upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Upstream>,

    /// Applied to named upstreams
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Upstream>,
}

/// Settings for one upstream.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    /// Upstream service name (overrides only)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Upstream namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Upstream partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Upstream peer
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer: String,

    /// Protocol override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    /// Connect timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<i32>,

    /// Circuit-breaking limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<UpstreamLimits>,

    /// Outlier detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive_health_check: Option<PassiveHealthCheck>,

    /// Mesh gateway mode for this upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_gateway: Option<MeshGateway>,
}

/// Circuit-breaking limits.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamLimits {
    /// Max connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<i32>,

    /// Max queued requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending_requests: Option<i32>,

    /// Max concurrent requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<i32>,
}

/// Outlier detection settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PassiveHealthCheck {
    /// Time between ejection sweeps
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,

    /// Consecutive failures before ejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failures: Option<u32>,

    /// Percent chance a 5xx streak triggers ejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcing_consecutive_5xx: Option<u32>,

    /// Minimum ejection time
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_ejection_time: String,
}

/// Addresses of a service outside the mesh.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefaultsDestination {
    /// Hostnames or IPs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    /// Port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

impl ConfigEntryResource for ServiceDefaults {
    const CONSUL_KIND: &'static str = "service-defaults";

    crate::config_entry_accessors!();

    fn needs_virtual_ip(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;
    use consul_client::{ConfigEntry, DATACENTER_META_KEY};
    use serde_json::json;

    fn defaults(protocol: &str) -> ServiceDefaults {
        ServiceDefaults {
            metadata: object_meta("web", "apps"),
            spec: ServiceDefaultsSpec {
                protocol: protocol.to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_to_consul_stamps_datacenter() {
        let entry = defaults("http").to_consul("dc1").unwrap();
        assert_eq!(entry.kind, "service-defaults");
        assert_eq!(entry.name, "web");
        assert_eq!(entry.meta[DATACENTER_META_KEY], "dc1");
        assert_eq!(entry.body["Protocol"], "http");
    }

    #[test]
    fn test_matches_live_entry_with_server_defaults() {
        let mut live: ConfigEntry = serde_json::from_value(json!({
            "Kind": "service-defaults",
            "Name": "web",
            "Protocol": "http",
            "MeshGateway": {},
            "TransparentProxy": {},
            "Expose": {},
            "Meta": {"consul.hashicorp.com/source-datacenter": "dc2"},
            "CreateIndex": 5,
            "ModifyIndex": 9
        }))
        .unwrap();
        assert!(defaults("http").matches_consul(&live).unwrap());

        live.body.insert("Protocol".to_string(), json!("grpc"));
        assert!(!defaults("http").matches_consul(&live).unwrap());
    }

    #[test]
    fn test_kind_mismatch_never_matches() {
        let live = ConfigEntry {
            kind: "service-resolver".to_string(),
            name: "web".to_string(),
            ..Default::default()
        };
        assert!(!defaults("").matches_consul(&live).unwrap());
    }

    #[test]
    fn test_acronym_fields_use_consul_spelling() {
        let mut resource = defaults("tcp");
        resource.spec.external_sni = "web.example.com".to_string();
        let body = resource.body().unwrap();
        assert_eq!(body["ExternalSNI"], "web.example.com");
    }
}

//! Consul API data models
//!
//! Wire shapes for config entries, catalog registrations, ACL objects and
//! namespaces. Field names follow Consul's PascalCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Meta key recording which datacenter created (and owns) a config entry.
pub const DATACENTER_META_KEY: &str = "consul.hashicorp.com/source-datacenter";

/// Meta key marking objects written from Kubernetes.
pub const EXTERNAL_SOURCE_META_KEY: &str = "external-source";

/// Value of [`EXTERNAL_SOURCE_META_KEY`].
pub const EXTERNAL_SOURCE_KUBERNETES: &str = "kubernetes";

/// Service catalog listing: service name to tags.
pub type ServiceTags = HashMap<String, Vec<String>>;

/// A config entry of any kind.
///
/// The common header is typed; the kind-specific body is kept as raw JSON so a
/// single type covers every kind the controllers manage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigEntry {
    /// Config entry kind (e.g. `service-defaults`)
    pub kind: String,

    /// Entry name
    pub name: String,

    /// Consul namespace the entry lives in
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Admin partition the entry lives in
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Entry metadata, including the owning datacenter
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    /// Raft index at creation
    #[serde(default, skip_serializing_if = "is_zero")]
    pub create_index: u64,

    /// Raft index of the last modification
    #[serde(default, skip_serializing_if = "is_zero")]
    pub modify_index: u64,

    /// Kind-specific fields
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ConfigEntry {
    /// Datacenter recorded in the entry's meta, empty when absent.
    #[must_use]
    pub fn source_datacenter(&self) -> &str {
        self.meta
            .get(DATACENTER_META_KEY)
            .map_or("", String::as_str)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if signature")]
fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Locality of a node or service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Locality {
    /// Region
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    /// Zone
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
}

/// A tagged service address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceAddress {
    /// Address
    pub address: String,
    /// Port
    pub port: i32,
}

/// DNS weights of a service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Weights {
    /// Weight while passing
    pub passing: i32,
    /// Weight while warning
    pub warning: i32,
}

/// Service part of a catalog registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    /// Service instance ID
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Service name
    pub service: String,
    /// Tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Service meta
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    /// Port
    #[serde(default)]
    pub port: i32,
    /// Address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Unix socket path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub socket_path: String,
    /// Tagged addresses
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tagged_addresses: BTreeMap<String, ServiceAddress>,
    /// DNS weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Weights>,
    /// Allow tag changes through the anti-entropy sync
    #[serde(default)]
    pub enable_tag_override: bool,
    /// Locality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<Locality>,
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// Definition of a health check attached to a catalog registration.
///
/// Durations are Consul duration strings such as `10s` or `1m30s`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheckDefinition {
    /// HTTP endpoint
    #[serde(rename = "HTTP", default, skip_serializing_if = "String::is_empty")]
    pub http: String,
    /// HTTP headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, Vec<String>>,
    /// HTTP method
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// HTTP body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// TLS server name
    #[serde(rename = "TLSServerName", default, skip_serializing_if = "String::is_empty")]
    pub tls_server_name: String,
    /// Skip TLS verification
    #[serde(rename = "TLSSkipVerify", default)]
    pub tls_skip_verify: bool,
    /// TCP endpoint
    #[serde(rename = "TCP", default, skip_serializing_if = "String::is_empty")]
    pub tcp: String,
    /// gRPC endpoint
    #[serde(rename = "GRPC", default, skip_serializing_if = "String::is_empty")]
    pub grpc: String,
    /// Use TLS for gRPC
    #[serde(rename = "GRPCUseTLS", default)]
    pub grpc_use_tls: bool,
    /// Check interval
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,
    /// Check timeout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    /// Deregister the service after it has been critical this long
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deregister_critical_service_after: String,
}

/// Health check part of a catalog registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentCheck {
    /// Node the check runs against
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node: String,
    /// Check ID
    #[serde(rename = "CheckID")]
    pub check_id: String,
    /// Check name
    pub name: String,
    /// Initial status (`passing`, `warning`, `critical`)
    pub status: String,
    /// Human-readable notes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Output of the last run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// Service instance the check belongs to
    #[serde(rename = "ServiceID", default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,
    /// Name of the service the check belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    /// Check type
    #[serde(rename = "Type", default, skip_serializing_if = "String::is_empty")]
    pub check_type: String,
    /// Exposed port for the check
    #[serde(default)]
    pub exposed_port: i32,
    /// Check definition
    #[serde(default)]
    pub definition: HealthCheckDefinition,
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// Body of `PUT /v1/catalog/register`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogRegistration {
    /// Node ID
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Node name
    pub node: String,
    /// Node address
    pub address: String,
    /// Node tagged addresses
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tagged_addresses: BTreeMap<String, String>,
    /// Node meta
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_meta: BTreeMap<String, String>,
    /// Datacenter
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
    /// Service to register
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<AgentService>,
    /// Check to register
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<AgentCheck>,
    /// Leave the node entry untouched
    #[serde(default)]
    pub skip_node_update: bool,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// Node locality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<Locality>,
}

/// Body of `PUT /v1/catalog/deregister`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogDeregistration {
    /// Node name
    pub node: String,
    /// Node address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Datacenter
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
    /// Service instance to remove
    #[serde(rename = "ServiceID", default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,
    /// Check to remove
    #[serde(rename = "CheckID", default, skip_serializing_if = "String::is_empty")]
    pub check_id: String,
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// An ACL policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclPolicy {
    /// Policy ID, assigned by Consul
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Policy name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// HCL rules
    #[serde(default)]
    pub rules: String,
    /// Datacenters the policy is valid in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// Link from a role to a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclLink {
    /// Linked policy ID
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Linked policy name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// An ACL role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclRole {
    /// Role ID
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Role name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Linked policies
    #[serde(default)]
    pub policies: Vec<AclLink>,
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// ACL defaults applied to tokens in a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceAclConfig {
    /// Policies applied to every token in the namespace
    #[serde(default)]
    pub policy_defaults: Vec<AclLink>,
}

/// A Consul namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Namespace {
    /// Namespace name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// ACL defaults
    #[serde(rename = "ACLs", default, skip_serializing_if = "Option::is_none")]
    pub acls: Option<NamespaceAclConfig>,
    /// Meta
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// Body of `PUT /v1/internal/service-virtual-ip`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceVirtualIpRequest {
    /// Service name
    pub service: String,
    /// Manually assigned virtual IPs
    #[serde(rename = "ManualVIPs")]
    pub manual_vips: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_entry_body_is_flattened() {
        let raw = json!({
            "Kind": "service-splitter",
            "Name": "web",
            "Namespace": "default",
            "Meta": { DATACENTER_META_KEY: "dc1" },
            "ModifyIndex": 17,
            "Splits": [{ "Weight": 100, "Service": "web" }]
        });
        let entry: ConfigEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.kind, "service-splitter");
        assert_eq!(entry.source_datacenter(), "dc1");
        assert_eq!(entry.modify_index, 17);
        assert!(entry.body.contains_key("Splits"));
        assert!(!entry.body.contains_key("Kind"));
    }

    #[test]
    fn test_missing_datacenter_meta_is_empty() {
        let entry = ConfigEntry {
            kind: "mesh".to_string(),
            name: "mesh".to_string(),
            ..Default::default()
        };
        assert_eq!(entry.source_datacenter(), "");
    }

    #[test]
    fn test_check_ids_use_consul_casing() {
        let check = AgentCheck {
            check_id: "web-http".to_string(),
            service_id: "web-1".to_string(),
            name: "http".to_string(),
            status: "passing".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["CheckID"], "web-http");
        assert_eq!(value["ServiceID"], "web-1");
    }
}

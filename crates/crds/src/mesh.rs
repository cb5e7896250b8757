//! Mesh CRD
//!
//! Mesh-wide settings. Global: the single entry must be named `mesh`.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "Mesh",
    namespaced,
    status = "SyncStatus",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// Transparent proxy behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_proxy: Option<MeshTransparentProxy>,

    /// Let services opt into permissive mTLS
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_enabling_permissive_mutual_tls: bool,

    /// TLS settings for sidecars and gateways
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<MeshTls>,

    /// HTTP settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<MeshHttp>,

    /// Peering settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peering: Option<PeeringMesh>,
}

/// Mesh-wide transparent proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshTransparentProxy {
    /// Only allow traffic to services inside the mesh
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mesh_destinations_only: bool,
}

/// TLS settings by direction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshTls {
    /// Incoming connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming: Option<MeshDirectionalTls>,

    /// Outgoing connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<MeshDirectionalTls>,
}

/// TLS version and cipher constraints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshDirectionalTls {
    /// Minimum version, e.g. `TLSv1_2`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_min_version: String,

    /// Maximum version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_max_version: String,

    /// Allowed cipher suites
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,
}

/// HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshHttp {
    /// Strip client-supplied `X-Forwarded-Client-Cert` headers
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sanitize_x_forwarded_client_cert: bool,
}

/// Peering settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeeringMesh {
    /// Route peering control traffic through mesh gateways
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub peer_through_mesh_gateways: bool,
}

impl ConfigEntryResource for Mesh {
    const CONSUL_KIND: &'static str = "mesh";
    const GLOBAL: bool = true;

    crate::config_entry_accessors!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;

    #[test]
    fn test_tls_field_names() {
        let mesh = Mesh {
            metadata: object_meta("mesh", "consul"),
            spec: MeshSpec {
                tls: Some(MeshTls {
                    incoming: Some(MeshDirectionalTls {
                        tls_min_version: "TLSv1_2".to_string(),
                        ..Default::default()
                    }),
                    outgoing: None,
                }),
                ..Default::default()
            },
            status: None,
        };
        let body = mesh.body().unwrap();
        assert_eq!(body["TLS"]["Incoming"]["TLSMinVersion"], "TLSv1_2");
        assert!(!mesh.needs_virtual_ip());
    }
}

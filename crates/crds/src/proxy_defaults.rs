//! ProxyDefaults CRD
//!
//! Mesh-wide proxy defaults. Global: the single entry must be named `global`.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use crate::shared::{Expose, MeshGateway, TransparentProxy, preserve_unknown_fields};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ProxyDefaults",
    namespaced,
    status = "SyncStatus",
    shortname = "proxy-defaults",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDefaultsSpec {
    /// Proxy mode: `direct` or `transparent`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// Transparent proxy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_proxy: Option<TransparentProxy>,

    /// Opaque proxy configuration passed to Envoy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<Value>,

    /// Mesh gateway mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_gateway: Option<MeshGateway>,

    /// Paths exposed without mTLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<Expose>,
}

impl ConfigEntryResource for ProxyDefaults {
    const CONSUL_KIND: &'static str = "proxy-defaults";
    const GLOBAL: bool = true;

    crate::config_entry_accessors!();
}

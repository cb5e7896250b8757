//! ControlPlaneRequestLimit CRD
//!
//! Rate limits on Consul server RPCs. Global.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ControlPlaneRequestLimit",
    namespaced,
    status = "SyncStatus",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneRequestLimitSpec {
    /// `permissive`, `enforcing` or `disabled`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// Default limits
    #[serde(flatten)]
    pub limits: ReadWriteRatesConfig,

    /// Per-endpoint overrides for the ACL subsystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<ReadWriteRatesConfig>,

    /// Per-endpoint overrides for the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<ReadWriteRatesConfig>,

    /// Per-endpoint overrides for config entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry: Option<ReadWriteRatesConfig>,

    /// Per-endpoint overrides for the KV store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kv: Option<ReadWriteRatesConfig>,
}

/// Requests per second allowed for reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadWriteRatesConfig {
    /// Reads per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_rate: Option<f64>,

    /// Writes per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_rate: Option<f64>,
}

impl ConfigEntryResource for ControlPlaneRequestLimit {
    const CONSUL_KIND: &'static str = "control-plane-request-limit";
    const GLOBAL: bool = true;

    crate::config_entry_accessors!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;

    #[test]
    fn test_default_rates_are_top_level() {
        let limit = ControlPlaneRequestLimit {
            metadata: object_meta("global-limits", "consul"),
            spec: ControlPlaneRequestLimitSpec {
                mode: "enforcing".to_string(),
                limits: ReadWriteRatesConfig {
                    read_rate: Some(100.0),
                    write_rate: Some(50.0),
                },
                acl: Some(ReadWriteRatesConfig {
                    read_rate: Some(10.0),
                    write_rate: None,
                }),
                ..Default::default()
            },
            status: None,
        };
        let body = limit.body().unwrap();
        assert_eq!(body["ReadRate"], 100.0);
        assert_eq!(body["ACL"]["ReadRate"], 10.0);
        assert!(body["ACL"].get("WriteRate").is_none());
        assert_eq!(limit.consul_mirroring_ns(), "default");
    }
}

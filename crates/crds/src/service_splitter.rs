//! ServiceSplitter CRD
//!
//! Weighted traffic splits across services or subsets.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use crate::shared::HttpHeaderModifiers;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ServiceSplitter",
    namespaced,
    status = "SyncStatus",
    shortname = "service-splitter",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSplitterSpec {
    /// Splits; weights must add up to 100
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<ServiceSplit>,
}

/// One leg of a split.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSplit {
    /// Percentage of traffic, up to two decimals
    pub weight: f32,

    /// Service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,

    /// Subset of that service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,

    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Request header rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HttpHeaderModifiers>,

    /// Response header rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HttpHeaderModifiers>,
}

impl ConfigEntryResource for ServiceSplitter {
    const CONSUL_KIND: &'static str = "service-splitter";

    crate::config_entry_accessors!();

    fn needs_virtual_ip(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;
    use consul_client::ConfigEntry;
    use serde_json::json;

    fn splitter() -> ServiceSplitter {
        ServiceSplitter {
            metadata: object_meta("web", "apps"),
            spec: ServiceSplitterSpec {
                splits: vec![
                    ServiceSplit {
                        weight: 90.0,
                        service_subset: "v1".to_string(),
                        ..Default::default()
                    },
                    ServiceSplit {
                        weight: 10.0,
                        service_subset: "v2".to_string(),
                        ..Default::default()
                    },
                ],
            },
            status: None,
        }
    }

    #[test]
    fn test_integer_weights_from_consul_match() {
        let live: ConfigEntry = serde_json::from_value(json!({
            "Kind": "service-splitter",
            "Name": "web",
            "Splits": [
                {"Weight": 90, "ServiceSubset": "v1"},
                {"Weight": 10, "ServiceSubset": "v2", "Namespace": "default"}
            ]
        }))
        .unwrap();
        assert!(splitter().matches_consul(&live).unwrap());
    }
}

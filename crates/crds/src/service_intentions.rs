//! ServiceIntentions CRD
//!
//! Access rules for one destination service. The Consul entry is named after
//! the destination, not the Kubernetes object, and carries the destination's
//! namespace itself.

use crate::conditions::SyncStatus;
use crate::config_entry::{ConfigEntryResource, has_wildcard};
use crate::consul_json::to_consul_fields;
use crate::error::CrdError;
use crate::shared::HeaderMatch;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields Consul fills in on every source.
const IGNORED_SOURCE_FIELDS: &[&str] = &[
    "legacyid",
    "legacymeta",
    "legacycreatetime",
    "legacyupdatetime",
    "precedence",
    "type",
];

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ServiceIntentions",
    namespaced,
    status = "SyncStatus",
    shortname = "service-intentions",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIntentionsSpec {
    /// Service the rules protect
    pub destination: IntentionDestination,

    /// Rules per source, most specific first
    #[serde(default)]
    pub sources: Vec<SourceIntention>,
}

/// Destination of a set of intentions.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntentionDestination {
    /// Service name, `*` for all
    pub name: String,

    /// Namespace, `*` for all
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// Rules for one source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceIntention {
    /// Source service name, `*` for all
    pub name: String,

    /// Source namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Source partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Source peer
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer: String,

    /// Source sameness group
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sameness_group: String,

    /// `allow` or `deny`; exclusive with permissions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,

    /// L7 permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<IntentionPermission>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// One L7 permission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntentionPermission {
    /// `allow` or `deny`
    pub action: String,

    /// HTTP criteria
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<IntentionHttpPermission>,
}

/// HTTP criteria of a permission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntentionHttpPermission {
    /// Exact path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_exact: String,

    /// Path prefix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_prefix: String,

    /// Path regex
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_regex: String,

    /// Header matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<HeaderMatch>,

    /// Allowed methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Serialize)]
struct IntentionsBody<'a> {
    sources: &'a [SourceIntention],
}

impl ConfigEntryResource for ServiceIntentions {
    const CONSUL_KIND: &'static str = "service-intentions";

    crate::config_entry_status!();

    fn body(&self) -> Result<Map<String, Value>, CrdError> {
        to_consul_fields(&IntentionsBody {
            sources: &self.spec.sources,
        })
    }

    fn consul_name(&self) -> String {
        self.spec.destination.name.clone()
    }

    fn consul_mirroring_ns(&self) -> String {
        if self.spec.destination.namespace.is_empty() {
            self.namespace().unwrap_or_default()
        } else {
            self.spec.destination.namespace.clone()
        }
    }

    fn entry_namespace(&self) -> Option<String> {
        Some(self.spec.destination.namespace.clone()).filter(|ns| !ns.is_empty())
    }

    fn needs_virtual_ip(&self) -> bool {
        !has_wildcard(&[&self.spec.destination.name, &self.spec.destination.namespace])
    }

    fn ignored_match_fields(&self) -> &'static [&'static str] {
        IGNORED_SOURCE_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;
    use consul_client::ConfigEntry;
    use serde_json::json;

    fn intentions(destination: &str, namespace: &str) -> ServiceIntentions {
        ServiceIntentions {
            metadata: object_meta("web-intentions", "apps"),
            spec: ServiceIntentionsSpec {
                destination: IntentionDestination {
                    name: destination.to_string(),
                    namespace: namespace.to_string(),
                },
                sources: vec![SourceIntention {
                    name: "frontend".to_string(),
                    action: "allow".to_string(),
                    ..Default::default()
                }],
            },
            status: None,
        }
    }

    #[test]
    fn test_named_after_destination() {
        let resource = intentions("web", "payments");
        let entry = resource.to_consul("dc1").unwrap();
        assert_eq!(entry.name, "web");
        assert_eq!(entry.namespace, "payments");
        assert!(entry.body.get("Destination").is_none());
        assert_eq!(resource.consul_mirroring_ns(), "payments");
    }

    #[test]
    fn test_mirroring_falls_back_to_object_namespace() {
        assert_eq!(intentions("web", "").consul_mirroring_ns(), "apps");
        assert_eq!(intentions("web", "").entry_namespace(), None);
    }

    #[test]
    fn test_wildcards_skip_virtual_ip() {
        assert!(intentions("web", "").needs_virtual_ip());
        assert!(!intentions("*", "").needs_virtual_ip());
        assert!(!intentions("web", "*").needs_virtual_ip());
    }

    #[test]
    fn test_server_filled_source_fields_ignored() {
        let live: ConfigEntry = serde_json::from_value(json!({
            "Kind": "service-intentions",
            "Name": "web",
            "Namespace": "payments",
            "Sources": [{
                "Name": "frontend",
                "Action": "allow",
                "Precedence": 9,
                "Type": "consul",
                "LegacyID": "1d3a"
            }]
        }))
        .unwrap();
        assert!(intentions("web", "payments").matches_consul(&live).unwrap());
    }
}

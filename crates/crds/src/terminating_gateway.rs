//! TerminatingGateway CRD
//!
//! Services outside the mesh that a terminating gateway fronts. Registrations
//! of those services get their write policy linked to the gateway's ACL role.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "TerminatingGateway",
    namespaced,
    status = "SyncStatus",
    shortname = "terminating-gateway",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TerminatingGatewaySpec {
    /// Services the gateway proxies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<LinkedService>,
}

/// A service behind the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedService {
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Service name, `*` for the whole namespace
    pub name: String,

    /// CA used to verify the upstream
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,

    /// Client certificate
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_file: String,

    /// Client key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_file: String,

    /// SNI sent upstream
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sni: String,

    /// Keep the original Host header
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_auto_host_rewrite: bool,
}

impl TerminatingGateway {
    /// Whether the gateway fronts `service`.
    ///
    /// An empty linked namespace means the default namespace.
    #[must_use]
    pub fn links_service(&self, service: &str, namespace: &str) -> bool {
        let scope = |ns: &str| if ns.is_empty() { "default" } else { ns }.to_string();
        self.spec
            .services
            .iter()
            .any(|s| s.name == service && scope(&s.namespace) == scope(namespace))
    }
}

impl ConfigEntryResource for TerminatingGateway {
    const CONSUL_KIND: &'static str = "terminating-gateway";

    crate::config_entry_accessors!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;

    fn gateway(services: &[(&str, &str)]) -> TerminatingGateway {
        TerminatingGateway {
            metadata: object_meta("terminating-gateway", "consul"),
            spec: TerminatingGatewaySpec {
                services: services
                    .iter()
                    .map(|(name, ns)| LinkedService {
                        name: (*name).to_string(),
                        namespace: (*ns).to_string(),
                        ..Default::default()
                    })
                    .collect(),
            },
            status: None,
        }
    }

    #[test]
    fn test_links_service_treats_empty_namespace_as_default() {
        let gw = gateway(&[("service-name", ""), ("billing", "finance")]);
        assert!(gw.links_service("service-name", "default"));
        assert!(gw.links_service("service-name", ""));
        assert!(gw.links_service("billing", "finance"));
        assert!(!gw.links_service("billing", ""));
        assert!(!gw.links_service("other", ""));
    }

    #[test]
    fn test_file_fields_use_consul_spelling() {
        let mut gw = gateway(&[("db", "")]);
        gw.spec.services[0].ca_file = "/etc/ca.pem".to_string();
        let body = gw.body().unwrap();
        assert_eq!(body["Services"][0]["CAFile"], "/etc/ca.pem");
        assert_eq!(body["Services"][0]["Name"], "db");
    }
}

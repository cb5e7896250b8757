//! ServiceRouter CRD
//!
//! L7 routes matched on path, headers, query parameters and methods.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use crate::shared::{HeaderMatch, HttpHeaderModifiers};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ServiceRouter",
    namespaced,
    status = "SyncStatus",
    shortname = "service-router",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRouterSpec {
    /// Routes evaluated in order; the first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<ServiceRoute>,
}

/// A single route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRoute {
    /// Match criteria; absent matches everything
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub route_match: Option<ServiceRouteMatch>,

    /// Where matching traffic goes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ServiceRouteDestination>,
}

/// Route match wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRouteMatch {
    /// HTTP match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ServiceRouteHttpMatch>,
}

/// HTTP match criteria.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRouteHttpMatch {
    /// Exact path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_exact: String,

    /// Path prefix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_prefix: String,

    /// Path regex
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_regex: String,

    /// Header matches, all of which must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<HeaderMatch>,

    /// Query parameter matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_param: Vec<QueryParamMatch>,

    /// Allowed methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

/// Match on a query parameter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParamMatch {
    /// Parameter name
    pub name: String,

    /// Match when present
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub present: bool,

    /// Exact value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exact: String,

    /// Value regex
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
}

/// Route destination.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRouteDestination {
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

    /// Replacement for the matched path prefix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix_rewrite: String,

    /// Request timeout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_timeout: String,

    /// Idle timeout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub idle_timeout: String,

    /// Retry count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_retries: Option<u32>,

    /// Retry on connect failure
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retry_on_connect_failure: bool,

    /// Envoy retry conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on: Vec<String>,

    /// Status codes that trigger a retry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on_status_codes: Vec<u32>,

    /// Request header rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HttpHeaderModifiers>,

    /// Response header rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HttpHeaderModifiers>,
}

impl ConfigEntryResource for ServiceRouter {
    const CONSUL_KIND: &'static str = "service-router";

    crate::config_entry_accessors!();

    fn needs_virtual_ip(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::object_meta;
    use std::collections::BTreeMap;

    #[test]
    fn test_route_body_shape() {
        let mut set = BTreeMap::new();
        set.insert("x-canary".to_string(), "true".to_string());
        let router = ServiceRouter {
            metadata: object_meta("web", "apps"),
            spec: ServiceRouterSpec {
                routes: vec![ServiceRoute {
                    route_match: Some(ServiceRouteMatch {
                        http: Some(ServiceRouteHttpMatch {
                            path_prefix: "/admin".to_string(),
                            ..Default::default()
                        }),
                    }),
                    destination: Some(ServiceRouteDestination {
                        service: "admin".to_string(),
                        request_timeout: "120s".to_string(),
                        request_headers: Some(HttpHeaderModifiers {
                            set,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                }],
            },
            status: None,
        };

        let body = router.body().unwrap();
        let route = &body["Routes"][0];
        assert_eq!(route["Match"]["HTTP"]["PathPrefix"], "/admin");
        assert_eq!(route["Destination"]["RequestTimeout"], "2m0s");
        assert_eq!(route["Destination"]["RequestHeaders"]["Set"]["x-canary"], "true");
    }
}

//! ServiceResolver CRD
//!
//! Subsets, redirects, failover and load balancing for one service.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ServiceResolver",
    namespaced,
    status = "SyncStatus",
    shortname = "service-resolver",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResolverSpec {
    /// Subset used when none is requested
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_subset: String,

    /// Named subsets of instances
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subsets: BTreeMap<String, ServiceResolverSubset>,

    /// Send all traffic somewhere else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<ServiceResolverRedirect>,

    /// Failover targets by subset name, `*` for any
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failover: BTreeMap<String, ServiceResolverFailover>,

    /// Upstream connect timeout, e.g. `15s`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connect_timeout: String,

    /// Upstream request timeout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_timeout: String,

    /// Load balancing policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
}

/// A filtered subset of instances.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResolverSubset {
    /// Catalog filter expression
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,

    /// Exclude instances with warning checks
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub only_passing: bool,
}

/// Redirect target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResolverRedirect {
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

    /// Datacenter
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,

    /// Cluster peer
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer: String,
}

/// Failover target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResolverFailover {
    /// Service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,

    /// Subset of that service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,

    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Datacenters tried in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,

    /// Sameness group to fail over to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sameness_group: String,
}

/// Load balancing policy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// `random`, `round_robin`, `least_request`, `ring_hash` or `maglev`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy: String,

    /// Ring hash tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_hash_config: Option<RingHashConfig>,

    /// Least request tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub least_request_config: Option<LeastRequestConfig>,

    /// Hash inputs for hashing policies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hash_policies: Vec<HashPolicy>,
}

/// Ring hash tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RingHashConfig {
    /// Minimum ring size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_ring_size: Option<u64>,

    /// Maximum ring size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_ring_size: Option<u64>,
}

/// Least request tuning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeastRequestConfig {
    /// Hosts sampled per pick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_count: Option<u32>,
}

/// One hash input.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HashPolicy {
    /// `header`, `cookie` or `query_parameter`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,

    /// Name of the header, cookie or parameter
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_value: String,

    /// Cookie settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_config: Option<CookieConfig>,

    /// Hash on the source IP
    #[serde(default, skip_serializing_if = "std::ops::Not::not", rename = "sourceIP")]
    pub source_ip: bool,

    /// Stop evaluating further policies on a match
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
}

/// Cookie hashing settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CookieConfig {
    /// Session cookie
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub session: bool,

    /// Generated cookie lifetime
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ttl: String,

    /// Cookie path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl ConfigEntryResource for ServiceResolver {
    const CONSUL_KIND: &'static str = "service-resolver";

    crate::config_entry_accessors!();

    fn needs_virtual_ip(&self) -> bool {
        true
    }
}

//! SamenessGroup CRD

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "SamenessGroup",
    namespaced,
    status = "SyncStatus",
    shortname = "sameness-group",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SamenessGroupSpec {
    /// Use this group for failover by default
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default_for_failover: bool,

    /// Include the local partition in the group
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_local: bool,

    /// Members in failover order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<SamenessGroupMember>,
}

/// A partition or peer in the group.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SamenessGroupMember {
    /// Admin partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Cluster peer
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer: String,
}

impl ConfigEntryResource for SamenessGroup {
    const CONSUL_KIND: &'static str = "sameness-group";

    crate::config_entry_accessors!();
}

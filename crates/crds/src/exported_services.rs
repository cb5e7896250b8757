//! ExportedServices CRD
//!
//! Services a partition makes available to other partitions and peers.
//! Global: one entry per partition, named after it.

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "ExportedServices",
    namespaced,
    status = "SyncStatus",
    shortname = "exported-services",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExportedServicesSpec {
    /// Exported services and their consumers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ExportedService>,
}

/// One exported service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedService {
    /// Service name, `*` for all
    pub name: String,

    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Who may import it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<ServiceConsumer>,
}

/// An importer; exactly one field is set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConsumer {
    /// Admin partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Cluster peer
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer: String,

    /// Sameness group
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sameness_group: String,
}

impl ConfigEntryResource for ExportedServices {
    const CONSUL_KIND: &'static str = "exported-services";
    const GLOBAL: bool = true;

    crate::config_entry_accessors!();
}

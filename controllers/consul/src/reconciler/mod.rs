//! Reconciliation of config-entry resources.
//!
//! Every config-entry kind goes through the same [`Reconciler::reconcile_entry`];
//! the kinds only differ in their [`crds::ConfigEntryResource`] implementation.
//!
//! - `config_entry`: the create/update/delete/migrate decision
//! - `namespace`: which Consul namespace an entry lives in
//! - `virtual_ip`: manual virtual IPs for transparent proxy routing

pub mod config_entry;
pub mod namespace;
pub mod virtual_ip;

use crate::config::ControllerConfig;
use crate::store::ServiceDirectory;
use consul_client::{ConsulClientTrait, NamespaceMapping, QueryOptions, WriteOptions};
use std::sync::Arc;

/// Status reason: a Consul call failed.
pub const REASON_CONSUL_AGENT_ERROR: &str = "ConsulAgentError";

/// Status reason: patching the Kubernetes object failed.
pub const REASON_CONSUL_PATCH_ERROR: &str = "ConsulPatchError";

/// Status reason: the entry belongs to another datacenter or was created outside Kubernetes.
pub const REASON_EXTERNALLY_MANAGED: &str = "ExternallyManagedConfigError";

/// Status reason: the migrate annotation is set but the entries differ.
pub const REASON_MIGRATION_FAILED: &str = "MigrationFailedError";

/// Where and as whom config entries are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSettings {
    /// Datacenter stamped on written entries
    pub datacenter: String,
    /// Admin partition, empty when partitions are off
    pub partition: String,
    /// Kubernetes to Consul namespace mapping
    pub namespaces: NamespaceMapping,
    /// Default policy for namespaces created on demand
    pub cross_namespace_acl_policy: String,
}

impl From<&ControllerConfig> for SyncSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            datacenter: config.datacenter.clone(),
            partition: config.partition.clone(),
            namespaces: config.namespaces.clone(),
            cross_namespace_acl_policy: config.cross_namespace_acl_policy.clone(),
        }
    }
}

/// Reconciles config-entry resources against Consul.
pub struct Reconciler {
    pub(crate) consul: Arc<dyn ConsulClientTrait>,
    pub(crate) services: Arc<dyn ServiceDirectory>,
    pub(crate) settings: SyncSettings,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("consul", &self.consul.base_url())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler.
    pub fn new(
        consul: Arc<dyn ConsulClientTrait>,
        services: Arc<dyn ServiceDirectory>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            consul,
            services,
            settings,
        }
    }

    pub(crate) fn query_options(&self, consul_namespace: &str) -> QueryOptions {
        QueryOptions::namespaced(consul_namespace).with_partition(&self.settings.partition)
    }

    pub(crate) fn write_options(&self, consul_namespace: &str) -> WriteOptions {
        WriteOptions::namespaced(consul_namespace).with_partition(&self.settings.partition)
    }
}

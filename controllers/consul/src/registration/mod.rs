//! Catalog registrations of services outside Kubernetes.
//!
//! - `cache`: what the controller has registered, kept honest by a blocking
//!   watch on the Consul catalog
//! - `acl`: write policies linking registered services to terminating gateways
//! - `reconciler`: the Registration reconcile and the deregistration consumer

pub mod acl;
pub mod cache;
#[cfg(test)]
mod cache_test;
pub mod reconciler;

use crate::config::ControllerConfig;

/// Catalog filter skipping services registered by the endpoints controller.
pub const NOT_IN_SERVICE_MESH_FILTER: &str =
    r#"ServiceMeta["managed-by"] != "consul-k8s-endpoints-controller""#;

/// Consul's own catalog entry, never cached.
pub const CONSUL_SERVICE: &str = "consul";

/// Capacity of the deregistration channel.
pub const DEREGISTRATION_CHANNEL_CAPACITY: usize = 64;

/// Status reason: some step of the reconcile failed.
pub const REASON_SYNC_ERROR: &str = "SyncError";

/// Status reason: the catalog register call failed.
pub const REASON_CONSUL_ERROR_REGISTRATION: &str = "ConsulErrorRegistration";

/// Status reason: the catalog deregister call failed.
pub const REASON_CONSUL_ERROR_DEREGISTRATION: &str = "ConsulErrorDeregistration";

/// Status reason: terminating gateway ACL linkage failed.
pub const REASON_CONSUL_ERROR_ACL: &str = "ConsulErrorACL";

/// Status reason: the service disappeared from the catalog on its own.
pub const REASON_CONSUL_DEREGISTERED: &str = "ConsulDeregistered";

/// Feature switches for registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSettings {
    /// Link write policies to terminating gateway roles
    pub acls_enabled: bool,
    /// Wrap policy rules in a namespace block
    pub namespaces_enabled: bool,
    /// Wrap policy rules in a partition block
    pub partitions_enabled: bool,
    /// Partition the catalog watch runs in
    pub partition: String,
}

impl From<&ControllerConfig> for RegistrationSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            acls_enabled: config.acls_enabled(),
            namespaces_enabled: config.namespaces.enabled,
            partitions_enabled: config.partitions_enabled(),
            partition: config.partition.clone(),
        }
    }
}

/// `""` and `default` both mean the default namespace.
pub(crate) fn is_default_namespace(namespace: &str) -> bool {
    namespace.is_empty() || namespace == consul_client::namespaces::DEFAULT_NAMESPACE
}

//! Consul namespace helpers
//!
//! Mapping from Kubernetes namespaces to Consul namespaces, and creation of
//! destination namespaces on demand.

use crate::common::{QueryOptions, WriteOptions};
use crate::consul_trait::ConsulClientTrait;
use crate::error::ConsulError;
use crate::models::{
    AclLink, EXTERNAL_SOURCE_KUBERNETES, EXTERNAL_SOURCE_META_KEY, Namespace, NamespaceAclConfig,
};
use std::collections::BTreeMap;
use tracing::debug;

/// The namespace every Consul Enterprise cluster starts with.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Wildcard namespace used by intentions.
pub const WILDCARD_NAMESPACE: &str = "*";

/// How Kubernetes namespaces map onto Consul namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMapping {
    /// Whether Consul namespaces are in use at all
    pub enabled: bool,
    /// Fixed destination when not mirroring
    pub destination_namespace: String,
    /// Mirror each Kubernetes namespace into a Consul namespace of the same name
    pub mirroring: bool,
    /// Prefix added to mirrored names
    pub mirroring_prefix: String,
}

impl NamespaceMapping {
    /// Consul namespace for objects from Kubernetes namespace `kube_ns`.
    ///
    /// Empty when namespaces are disabled.
    #[must_use]
    pub fn consul_namespace(&self, kube_ns: &str) -> String {
        if !self.enabled {
            return String::new();
        }
        if self.mirroring {
            return format!("{}{}", self.mirroring_prefix, kube_ns);
        }
        self.destination_namespace.clone()
    }
}

/// Create `namespace` unless it already exists. Returns whether it was created.
///
/// New namespaces get `cross_ns_acl_policy` (when non-empty) as their default
/// policy so tokens from other namespaces keep cross-namespace read access.
pub async fn ensure_exists(
    client: &dyn ConsulClientTrait,
    namespace: &str,
    cross_ns_acl_policy: &str,
    partition: &str,
) -> Result<bool, ConsulError> {
    if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
        return Ok(false);
    }

    let query = QueryOptions::default().with_partition(partition);
    if client.namespace_read(namespace, &query).await?.is_some() {
        return Ok(false);
    }

    let acls = (!cross_ns_acl_policy.is_empty()).then(|| NamespaceAclConfig {
        policy_defaults: vec![AclLink {
            id: String::new(),
            name: cross_ns_acl_policy.to_string(),
        }],
    });
    let mut meta = BTreeMap::new();
    meta.insert(
        EXTERNAL_SOURCE_META_KEY.to_string(),
        EXTERNAL_SOURCE_KUBERNETES.to_string(),
    );

    debug!(namespace, "Creating Consul namespace");
    client
        .namespace_create(
            &Namespace {
                name: namespace.to_string(),
                description: "Auto-generated by consul-k8s".to_string(),
                acls,
                meta,
                partition: partition.to_string(),
            },
            &WriteOptions::default().with_partition(partition),
        )
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_mapping_is_empty() {
        let mapping = NamespaceMapping {
            enabled: false,
            mirroring: true,
            ..Default::default()
        };
        assert_eq!(mapping.consul_namespace("team-a"), "");
    }

    #[test]
    fn test_mirroring_applies_prefix() {
        let mapping = NamespaceMapping {
            enabled: true,
            destination_namespace: "ignored".to_string(),
            mirroring: true,
            mirroring_prefix: "k8s-".to_string(),
        };
        assert_eq!(mapping.consul_namespace("team-a"), "k8s-team-a");
    }

    #[test]
    fn test_fixed_destination() {
        let mapping = NamespaceMapping {
            enabled: true,
            destination_namespace: "mesh".to_string(),
            ..Default::default()
        };
        assert_eq!(mapping.consul_namespace("team-a"), "mesh");
        assert_eq!(mapping.consul_namespace("team-b"), "mesh");
    }
}

//! Consul namespace of a config entry.

use crate::reconciler::Reconciler;
use consul_client::NamespaceMapping;
use consul_client::namespaces::WILDCARD_NAMESPACE;
use crds::ConfigEntryResource;

/// Consul namespace for an entry.
///
/// `entry_namespace` is the namespace the entry itself carries (intentions),
/// `mirroring_ns` the Kubernetes namespace fed into the mapping. Global kinds
/// and wildcard namespaces are used as they are, never prefixed.
#[must_use]
pub fn consul_namespace(
    mapping: &NamespaceMapping,
    entry_namespace: Option<&str>,
    mirroring_ns: &str,
    global: bool,
) -> String {
    if !mapping.enabled {
        return String::new();
    }
    if let Some(ns) = entry_namespace.filter(|ns| !ns.is_empty()) {
        return ns.to_string();
    }
    if !global && mirroring_ns != WILDCARD_NAMESPACE {
        return mapping.consul_namespace(mirroring_ns);
    }
    mirroring_ns.to_string()
}

impl Reconciler {
    /// Consul namespace `resource` syncs into.
    pub(crate) fn consul_namespace_of<K: ConfigEntryResource>(&self, resource: &K) -> String {
        consul_namespace(
            &self.settings.namespaces,
            resource.entry_namespace().as_deref(),
            &resource.consul_mirroring_ns(),
            K::GLOBAL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirroring(prefix: &str) -> NamespaceMapping {
        NamespaceMapping {
            enabled: true,
            destination_namespace: "default".to_string(),
            mirroring: true,
            mirroring_prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_disabled_namespaces_are_empty() {
        let mapping = NamespaceMapping::default();
        assert_eq!(consul_namespace(&mapping, Some("team-a"), "team-a", false), "");
    }

    #[test]
    fn test_entry_namespace_wins() {
        assert_eq!(consul_namespace(&mirroring("k8s-"), Some("billing"), "web", false), "billing");
        assert_eq!(consul_namespace(&mirroring("k8s-"), Some(""), "web", false), "k8s-web");
    }

    #[test]
    fn test_global_kinds_are_not_mapped() {
        assert_eq!(consul_namespace(&mirroring("k8s-"), None, "default", true), "default");
    }

    #[test]
    fn test_wildcard_is_not_mapped() {
        assert_eq!(consul_namespace(&mirroring("k8s-"), None, "*", false), "*");
    }

    #[test]
    fn test_fixed_destination() {
        let mapping = NamespaceMapping {
            enabled: true,
            destination_namespace: "mesh".to_string(),
            ..Default::default()
        };
        assert_eq!(consul_namespace(&mapping, None, "team-a", false), "mesh");
    }
}

//! The capability every config-entry custom resource provides
//!
//! The reconciler is written once against [`ConfigEntryResource`]; each kind
//! only says which Consul kind it is, how its spec serializes and which
//! quirks (global scope, virtual IPs, ignored fields) apply.

use crate::conditions::{ConditionStatus, SyncStatus};
use crate::consul_json::bodies_match;
use crate::error::CrdError;
use consul_client::{
    ConfigEntry, DATACENTER_META_KEY, EXTERNAL_SOURCE_KUBERNETES, EXTERNAL_SOURCE_META_KEY,
};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// API group of every CRD in this crate.
pub const GROUP: &str = "consul.hashicorp.com";

/// Finalizer guarding the Consul entry of a config-entry resource.
pub const CONFIG_ENTRY_FINALIZER: &str = "finalizers.consul.hashicorp.com";

/// Annotation asking the controller to adopt an entry created elsewhere.
pub const MIGRATE_ENTRY_ANNOTATION: &str = "consul.hashicorp.com/migrate-entry";

/// Value of [`MIGRATE_ENTRY_ANNOTATION`] that enables adoption.
pub const MIGRATE_ENTRY_TRUE: &str = "true";

/// Namespace used for the mirroring lookup of global kinds.
pub const GLOBAL_MIRRORING_NAMESPACE: &str = "default";

/// Meta stamped on entries written from this datacenter.
#[must_use]
pub fn entry_meta(datacenter: &str) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert(DATACENTER_META_KEY.to_string(), datacenter.to_string());
    meta.insert(
        EXTERNAL_SOURCE_META_KEY.to_string(),
        EXTERNAL_SOURCE_KUBERNETES.to_string(),
    );
    meta
}

/// A namespaced custom resource that mirrors one Consul config entry.
pub trait ConfigEntryResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Consul's name for the kind, e.g. `service-defaults`.
    const CONSUL_KIND: &'static str;

    /// Global kinds live in the default namespace regardless of mapping.
    const GLOBAL: bool = false;

    /// Spec in Consul's field naming, without the entry header.
    fn body(&self) -> Result<Map<String, Value>, CrdError>;

    /// Current status, if any was written.
    fn status(&self) -> Option<&SyncStatus>;

    /// Mutable status, created empty when missing.
    fn status_mut(&mut self) -> &mut SyncStatus;

    /// Name of the Kubernetes object.
    fn kubernetes_name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    /// Name of the Consul entry.
    fn consul_name(&self) -> String {
        self.kubernetes_name()
    }

    /// Namespace fed into the namespace mapping.
    fn consul_mirroring_ns(&self) -> String {
        if Self::GLOBAL {
            GLOBAL_MIRRORING_NAMESPACE.to_string()
        } else {
            self.meta().namespace.clone().unwrap_or_default()
        }
    }

    /// Namespace carried inside the entry itself, when the kind has one.
    fn entry_namespace(&self) -> Option<String> {
        None
    }

    /// Whether the entry's service should get a manual virtual IP.
    fn needs_virtual_ip(&self) -> bool {
        false
    }

    /// Lowercase field names Consul fills in that are never compared.
    fn ignored_match_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// The entry to write, stamped with `datacenter`.
    fn to_consul(&self, datacenter: &str) -> Result<ConfigEntry, CrdError> {
        Ok(ConfigEntry {
            kind: Self::CONSUL_KIND.to_string(),
            name: self.consul_name(),
            namespace: self.entry_namespace().unwrap_or_default(),
            meta: entry_meta(datacenter),
            body: self.body()?,
            ..Default::default()
        })
    }

    /// Whether `candidate` already holds this resource's desired state.
    ///
    /// Meta, namespace, partition and raft indexes are ignored.
    fn matches_consul(&self, candidate: &ConfigEntry) -> Result<bool, CrdError> {
        if candidate.kind != Self::CONSUL_KIND || candidate.name != self.consul_name() {
            return Ok(false);
        }
        Ok(bodies_match(
            &self.body()?,
            &candidate.body,
            self.ignored_match_fields(),
        ))
    }

    /// Status of the `Synced` condition.
    fn synced_condition_status(&self) -> ConditionStatus {
        self.status()
            .map_or(ConditionStatus::Unknown, SyncStatus::synced_condition_status)
    }

    /// Whether the migrate annotation is set to `true`.
    fn has_migration_key(&self) -> bool {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(MIGRATE_ENTRY_ANNOTATION))
            .is_some_and(|v| v == MIGRATE_ENTRY_TRUE)
    }
}

/// Implements the spec and status accessors for a `CustomResource` whose
/// status type is [`SyncStatus`].
#[macro_export]
macro_rules! config_entry_accessors {
    () => {
        fn body(&self) -> Result<serde_json::Map<String, serde_json::Value>, $crate::CrdError> {
            $crate::consul_json::to_consul_fields(&self.spec)
        }

        $crate::config_entry_status!();
    };
}

/// Status accessors only, for kinds with a custom `body`.
#[macro_export]
macro_rules! config_entry_status {
    () => {
        fn status(&self) -> Option<&$crate::SyncStatus> {
            self.status.as_ref()
        }

        fn status_mut(&mut self) -> &mut $crate::SyncStatus {
            self.status.get_or_insert_with(Default::default)
        }
    };
}

/// Whether a name, namespace or partition is a wildcard.
#[must_use]
pub fn has_wildcard(parts: &[&str]) -> bool {
    parts.iter().any(|p| p.contains('*'))
}

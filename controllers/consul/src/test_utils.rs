//! Test utilities for unit testing reconcilers
//!
//! In-memory stand-ins for the Kubernetes side of the controller plus
//! builders for the resources the tests reconcile.

use crate::error::ControllerError;
use crate::store::{ResourceStore, ServiceDirectory};
use async_trait::async_trait;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

type StatusSetter<K> = fn(&mut K, SyncStatus);

#[derive(Debug)]
struct StoreState<K> {
    objects: BTreeMap<(String, String), K>,
    resource_version: u64,
    status_writes: Vec<SyncStatus>,
    fail_finalizer_patches: bool,
    fail_status_updates: bool,
}

/// [`ResourceStore`] keeping objects in memory.
///
/// Behaves like the API server where the reconcilers depend on it: every write
/// bumps the object's `resourceVersion`, a finalizer patch carrying a stale
/// `resourceVersion` conflicts, and removing the last finalizer of an object
/// with a deletion timestamp deletes it.
#[derive(Debug)]
pub struct InMemoryStore<K> {
    state: Mutex<StoreState<K>>,
    set_status: StatusSetter<K>,
}

impl<K: Resource + Clone> InMemoryStore<K> {
    fn with_setter(set_status: StatusSetter<K>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                objects: BTreeMap::new(),
                resource_version: 1,
                status_writes: Vec::new(),
                fail_finalizer_patches: false,
                fail_status_updates: false,
            }),
            set_status,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(resource: &K) -> (String, String) {
        (
            resource.meta().namespace.clone().unwrap_or_default(),
            resource.meta().name.clone().unwrap_or_default(),
        )
    }

    /// Store `resource`, replacing any object with the same key.
    pub fn insert(&self, resource: K) {
        self.state().objects.insert(Self::key(&resource), resource);
    }

    /// Current copy of an object; cluster-scoped objects use an empty namespace.
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.state()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every status written so far, oldest first.
    pub fn status_writes(&self) -> Vec<SyncStatus> {
        self.state().status_writes.clone()
    }

    /// The most recent status write.
    pub fn last_status(&self) -> Option<SyncStatus> {
        self.state().status_writes.last().cloned()
    }

    /// Make finalizer patches fail.
    pub fn fail_finalizer_patches(&self) {
        self.state().fail_finalizer_patches = true;
    }

    /// Make status updates fail.
    pub fn fail_status_updates(&self) {
        self.state().fail_status_updates = true;
    }
}

impl<K: ConfigEntryResource> InMemoryStore<K> {
    /// Store for a config-entry kind.
    pub fn for_entries() -> Self {
        Self::with_setter(|resource, status| *resource.status_mut() = status)
    }
}

impl InMemoryStore<Registration> {
    /// Store for Registrations.
    pub fn for_registrations() -> Self {
        Self::with_setter(|resource, status| resource.status = Some(status))
    }
}

impl<K: Resource> StoreState<K> {
    fn bump(&mut self, key: &(String, String)) -> Option<&mut K> {
        self.resource_version += 1;
        let version = self.resource_version.to_string();
        let stored = self.objects.get_mut(key)?;
        stored.meta_mut().resource_version = Some(version);
        Some(stored)
    }
}

#[async_trait]
impl<K> ResourceStore<K> for InMemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, ControllerError> {
        Ok(self.object(namespace.unwrap_or_default(), name))
    }

    async fn list(&self) -> Result<Vec<K>, ControllerError> {
        Ok(self.state().objects.values().cloned().collect())
    }

    async fn patch_finalizers(&self, resource: &K, finalizers: &[String]) -> Result<(), ControllerError> {
        let mut state = self.state();
        if state.fail_finalizer_patches {
            return Err(ControllerError::Reconciliation("injected finalizer patch failure".to_string()));
        }
        let key = Self::key(resource);
        let Some(current) = state.objects.get(&key) else {
            return Err(ControllerError::Reconciliation(format!("{key:?} not found")));
        };
        let sent = resource.meta().resource_version.clone();
        if sent.is_some() && sent != current.meta().resource_version {
            return Err(ControllerError::Reconciliation(format!(
                "409 Conflict: {key:?} sent resourceVersion {sent:?}, stored {:?}",
                current.meta().resource_version
            )));
        }
        let Some(stored) = state.bump(&key) else {
            return Err(ControllerError::Reconciliation(format!("{key:?} not found")));
        };
        stored.meta_mut().finalizers = Some(finalizers.to_vec());
        if finalizers.is_empty() && stored.meta().deletion_timestamp.is_some() {
            state.objects.remove(&key);
        }
        Ok(())
    }

    async fn update_status(&self, resource: &K, status: &SyncStatus) -> Result<K, ControllerError> {
        let mut state = self.state();
        if state.fail_status_updates {
            return Err(ControllerError::Reconciliation("injected status update failure".to_string()));
        }
        state.status_writes.push(status.clone());
        match state.bump(&Self::key(resource)) {
            Some(stored) => {
                (self.set_status)(stored, status.clone());
                Ok(stored.clone())
            }
            None => {
                let mut written = resource.clone();
                (self.set_status)(&mut written, status.clone());
                Ok(written)
            }
        }
    }
}

/// [`ServiceDirectory`] answering from a fixed table.
#[derive(Debug, Default)]
pub struct StaticServiceDirectory {
    cluster_ips: HashMap<(String, String), String>,
}

impl StaticServiceDirectory {
    /// Directory with one Service.
    pub fn with_service(namespace: &str, name: &str, cluster_ip: &str) -> Self {
        let mut cluster_ips = HashMap::new();
        cluster_ips.insert((namespace.to_string(), name.to_string()), cluster_ip.to_string());
        Self { cluster_ips }
    }
}

#[async_trait]
impl ServiceDirectory for StaticServiceDirectory {
    async fn cluster_ip(&self, namespace: &str, name: &str) -> Result<Option<String>, ControllerError> {
        Ok(self
            .cluster_ips
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

/// Metadata for a live object.
pub fn object_meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(ToString::to_string),
        generation: Some(1),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}

/// Mark `resource` as being deleted while `finalizer` still holds it.
pub fn mark_deleted<K: Resource>(resource: &mut K, finalizer: &str) {
    let deleting: ObjectMeta = serde_json::from_value(json!({
        "deletionTimestamp": "2024-05-01T12:00:00Z",
    }))
    .unwrap();
    let meta = resource.meta_mut();
    meta.deletion_timestamp = deleting.deletion_timestamp;
    meta.finalizers = Some(with_finalizer(
        meta.finalizers.as_deref().unwrap_or_default(),
        finalizer,
    ));
}

/// A ServiceDefaults for `name` with the given protocol.
pub fn create_test_service_defaults(name: &str, namespace: &str, protocol: &str) -> ServiceDefaults {
    ServiceDefaults {
        metadata: object_meta(name, Some(namespace)),
        spec: ServiceDefaultsSpec {
            protocol: protocol.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// A Registration of `service` on an external node.
pub fn create_test_registration(name: &str, service: &str, namespace: &str) -> Registration {
    Registration {
        metadata: object_meta(name, None),
        spec: RegistrationSpec {
            node: "external-node".to_string(),
            address: "10.1.0.10".to_string(),
            service: RegistrationService {
                id: format!("{service}-1"),
                name: service.to_string(),
                port: 8080,
                namespace: namespace.to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        status: None,
    }
}

/// A TerminatingGateway in `consul` fronting the given `(service, namespace)` pairs.
pub fn create_test_terminating_gateway(name: &str, services: &[(&str, &str)]) -> TerminatingGateway {
    TerminatingGateway {
        metadata: object_meta(name, Some("consul")),
        spec: TerminatingGatewaySpec {
            services: services
                .iter()
                .map(|(service, namespace)| LinkedService {
                    name: (*service).to_string(),
                    namespace: (*namespace).to_string(),
                    ..Default::default()
                })
                .collect(),
        },
        status: None,
    }
}

/// Names of the finalizers on `resource`.
pub fn finalizers_of<K: Resource>(resource: &K) -> Vec<String> {
    resource.finalizers().to_vec()
}

//! Object store access.
//!
//! Reconcilers read and write Kubernetes objects through [`ResourceStore`] and
//! look up Services through [`ServiceDirectory`], so the unit tests can run
//! them against in-memory implementations.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::SyncStatus;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Read and patch access to one resource kind.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch an object; `None` when it does not exist.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, ControllerError>;

    /// All objects of the kind, across namespaces.
    async fn list(&self) -> Result<Vec<K>, ControllerError>;

    /// Replace the object's finalizer list.
    async fn patch_finalizers(&self, resource: &K, finalizers: &[String]) -> Result<(), ControllerError>;

    /// Replace the object's status and return the object as stored, with its
    /// new `resourceVersion`.
    async fn update_status(&self, resource: &K, status: &SyncStatus) -> Result<K, ControllerError>;
}

/// Cluster IP lookups for Kubernetes Services.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Cluster IP of `namespace/name`; `None` when the Service is missing or headless.
    async fn cluster_ip(&self, namespace: &str, name: &str) -> Result<Option<String>, ControllerError>;
}

type ApiFor<K> = fn(Client, Option<&str>) -> Api<K>;

/// [`ResourceStore`] backed by the Kubernetes API.
pub struct KubeStore<K> {
    client: Client,
    api_for: ApiFor<K>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

fn namespaced_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn cluster_api<K>(client: Client, _namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
{
    Api::all(client)
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    /// Store for a namespaced kind.
    #[must_use]
    pub fn namespaced(client: Client) -> Self {
        Self {
            client,
            api_for: namespaced_api::<K>,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
{
    /// Store for a cluster-scoped kind.
    #[must_use]
    pub fn cluster(client: Client) -> Self {
        Self {
            client,
            api_for: cluster_api::<K>,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = ()>,
{
    fn api_of(&self, resource: &K) -> Api<K> {
        (self.api_for)(self.client.clone(), resource.meta().namespace.as_deref())
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, ControllerError> {
        let api = (self.api_for)(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list(&self) -> Result<Vec<K>, ControllerError> {
        let api = (self.api_for)(self.client.clone(), None);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_finalizers(&self, resource: &K, finalizers: &[String]) -> Result<(), ControllerError> {
        // resourceVersion makes the merge patch fail on a concurrent update
        // instead of clobbering someone else's finalizer. Callers that wrote
        // the status first must pass the object update_status returned.
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": resource.resource_version(),
            }
        });
        self.api_of(resource)
            .patch(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn update_status(&self, resource: &K, status: &SyncStatus) -> Result<K, ControllerError> {
        let patch = json!({ "status": status });
        Ok(self
            .api_of(resource)
            .patch_status(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}

/// [`ServiceDirectory`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeServiceDirectory {
    client: Client,
}

impl Debug for KubeServiceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeServiceDirectory").finish_non_exhaustive()
    }
}

impl KubeServiceDirectory {
    /// Directory using `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceDirectory for KubeServiceDirectory {
    async fn cluster_ip(&self, namespace: &str, name: &str) -> Result<Option<String>, ControllerError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let Some(service) = api.get_opt(name).await? else {
            return Ok(None);
        };
        Ok(service
            .spec
            .and_then(|spec| spec.cluster_ip)
            .filter(|ip| !ip.is_empty() && ip != "None"))
    }
}

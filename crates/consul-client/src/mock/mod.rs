//! Mock ConsulClient for unit testing
//!
//! An in-memory implementation of [`ConsulClientTrait`] that the controller
//! tests drive instead of a running agent.
//!
//! The mock is organized by API area:
//! - `config.rs` - config entries, namespaces and virtual IPs
//! - `catalog.rs` - catalog registrations and blocking service listings
//! - `acl.rs` - ACL policies and roles

mod acl;
mod catalog;
mod config;

use crate::common::{QueryMeta, QueryOptions, WriteOptions};
use crate::consul_trait::ConsulClientTrait;
use crate::error::ConsulError;
use crate::models::{
    AclPolicy, AclRole, CatalogDeregistration, CatalogRegistration, ConfigEntry, Namespace,
    ServiceTags,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Operations of the mock that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `get_config_entry`
    GetConfigEntry,
    /// `set_config_entry`
    SetConfigEntry,
    /// `delete_config_entry`
    DeleteConfigEntry,
    /// `catalog_services`
    CatalogServices,
    /// `catalog_register`
    CatalogRegister,
    /// `catalog_deregister`
    CatalogDeregister,
    /// `acl_policy_read_by_name`
    PolicyReadByName,
    /// `acl_policy_create`
    PolicyCreate,
    /// `acl_policy_delete`
    PolicyDelete,
    /// `acl_role_list`
    RoleList,
    /// `acl_role_read`
    RoleRead,
    /// `acl_role_update`
    RoleUpdate,
    /// `namespace_read`
    NamespaceRead,
    /// `namespace_create`
    NamespaceCreate,
    /// `assign_service_virtual_ip`
    AssignVirtualIp,
}

/// How an injected failure surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// HTTP 500 from the agent
    ServerError,
    /// HTTP 404 from the agent
    NotFound,
}

/// Everything the mock agent knows.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    /// (namespace, kind, name) -> entry
    pub(crate) config_entries: BTreeMap<(String, String, String), ConfigEntry>,
    /// (namespace, node, service id) -> registration
    pub(crate) registrations: BTreeMap<(String, String, String), CatalogRegistration>,
    pub(crate) catalog_index: u64,
    pub(crate) raft_index: u64,
    pub(crate) policies: BTreeMap<String, AclPolicy>,
    pub(crate) roles: BTreeMap<String, AclRole>,
    pub(crate) namespaces: BTreeMap<String, Namespace>,
    /// (namespace, service) -> manual VIPs
    pub(crate) virtual_ips: BTreeMap<(String, String), Vec<String>>,
    pub(crate) failures: HashMap<MockOperation, MockFailure>,
    pub(crate) calls: HashMap<MockOperation, usize>,
}

/// Mock ConsulClient for testing
///
/// Clones share state, so a test can keep one handle for assertions while the
/// code under test owns another.
#[derive(Debug, Clone)]
pub struct MockConsulClient {
    pub(crate) base_url: String,
    pub(crate) state: Arc<Mutex<MockState>>,
    pub(crate) catalog_changed: Arc<Notify>,
}

impl Default for MockConsulClient {
    fn default() -> Self {
        Self::new("http://mock-consul:8500")
    }
}

impl MockConsulClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(MockState {
                catalog_index: 1,
                raft_index: 1,
                ..Default::default()
            })),
            catalog_changed: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and return the injected failure for it, if any.
    pub(crate) fn enter(&self, op: MockOperation) -> Result<(), ConsulError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get(&op) {
            Some(MockFailure::ServerError) => Err(ConsulError::Api {
                status: 500,
                body: format!("injected failure for {op:?}"),
            }),
            Some(MockFailure::NotFound) => Err(ConsulError::NotFound(format!(
                "injected not found for {op:?}"
            ))),
            None => Ok(()),
        }
    }

    // Failure injection

    /// Make every call of `op` fail with an HTTP 500.
    pub fn fail_on(&self, op: MockOperation) {
        self.state().failures.insert(op, MockFailure::ServerError);
    }

    /// Make every call of `op` fail with an HTTP 404.
    pub fn not_found_on(&self, op: MockOperation) {
        self.state().failures.insert(op, MockFailure::NotFound);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Number of calls made to `op`, including failed ones.
    #[must_use]
    pub fn calls(&self, op: MockOperation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or_default()
    }

    // Setup and inspection

    /// Store a config entry as if another writer had created it.
    pub fn add_config_entry(&self, namespace: &str, entry: ConfigEntry) {
        config::insert_entry(self, namespace, entry);
    }

    /// Current copy of a config entry.
    #[must_use]
    pub fn config_entry(&self, namespace: &str, kind: &str, name: &str) -> Option<ConfigEntry> {
        self.state()
            .config_entries
            .get(&(namespace.to_string(), kind.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored config entries across all namespaces.
    #[must_use]
    pub fn config_entry_count(&self) -> usize {
        self.state().config_entries.len()
    }

    /// Register a bare service directly in the catalog.
    pub fn add_catalog_service(&self, namespace: &str, name: &str, meta: BTreeMap<String, String>) {
        catalog::insert_service(self, namespace, name, meta);
    }

    /// Remove a service from the catalog out-of-band.
    pub fn remove_catalog_service(&self, namespace: &str, name: &str) {
        catalog::remove_service(self, namespace, name);
    }

    /// Names of the services currently in `namespace`.
    #[must_use]
    pub fn catalog_service_names(&self, namespace: &str) -> BTreeSet<String> {
        catalog::service_names(&self.state(), namespace)
    }

    /// Stored registration for a service instance.
    #[must_use]
    pub fn registration(&self, namespace: &str, node: &str, service_id: &str) -> Option<CatalogRegistration> {
        self.state()
            .registrations
            .get(&(namespace.to_string(), node.to_string(), service_id.to_string()))
            .cloned()
    }

    /// Add a role and return its generated ID.
    pub fn add_role(&self, name: &str) -> String {
        acl::insert_role(self, name)
    }

    /// Current copy of a role.
    #[must_use]
    pub fn role(&self, id: &str) -> Option<AclRole> {
        self.state().roles.get(id).cloned()
    }

    /// Current copy of a policy looked up by name.
    #[must_use]
    pub fn policy_by_name(&self, name: &str) -> Option<AclPolicy> {
        self.state().policies.values().find(|p| p.name == name).cloned()
    }

    /// Names of all existing namespaces.
    #[must_use]
    pub fn namespace_names(&self) -> BTreeSet<String> {
        self.state().namespaces.keys().cloned().collect()
    }

    /// Manual virtual IPs assigned to a service.
    #[must_use]
    pub fn virtual_ips(&self, namespace: &str, service: &str) -> Vec<String> {
        self.state()
            .virtual_ips
            .get(&(namespace.to_string(), service.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ConsulClientTrait for MockConsulClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_config_entry(
        &self,
        kind: &str,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<(ConfigEntry, QueryMeta), ConsulError> {
        config::get_config_entry(self, kind, name, opts)
    }

    async fn set_config_entry(
        &self,
        entry: &ConfigEntry,
        opts: &WriteOptions,
    ) -> Result<bool, ConsulError> {
        config::set_config_entry(self, entry, opts)
    }

    async fn delete_config_entry(
        &self,
        kind: &str,
        name: &str,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        config::delete_config_entry(self, kind, name, opts)
    }

    async fn catalog_services(
        &self,
        opts: &QueryOptions,
    ) -> Result<(ServiceTags, QueryMeta), ConsulError> {
        catalog::catalog_services(self, opts).await
    }

    async fn catalog_register(
        &self,
        registration: &CatalogRegistration,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        catalog::catalog_register(self, registration, opts)
    }

    async fn catalog_deregister(
        &self,
        deregistration: &CatalogDeregistration,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        catalog::catalog_deregister(self, deregistration, opts)
    }

    async fn acl_policy_read_by_name(
        &self,
        name: &str,
        _opts: &QueryOptions,
    ) -> Result<Option<AclPolicy>, ConsulError> {
        acl::policy_read_by_name(self, name)
    }

    async fn acl_policy_create(
        &self,
        policy: &AclPolicy,
        _opts: &WriteOptions,
    ) -> Result<AclPolicy, ConsulError> {
        acl::policy_create(self, policy)
    }

    async fn acl_policy_delete(&self, id: &str, _opts: &WriteOptions) -> Result<(), ConsulError> {
        acl::policy_delete(self, id)
    }

    async fn acl_role_list(&self, _opts: &QueryOptions) -> Result<Vec<AclRole>, ConsulError> {
        acl::role_list(self)
    }

    async fn acl_role_read(
        &self,
        id: &str,
        _opts: &QueryOptions,
    ) -> Result<Option<AclRole>, ConsulError> {
        acl::role_read(self, id)
    }

    async fn acl_role_update(
        &self,
        role: &AclRole,
        _opts: &WriteOptions,
    ) -> Result<AclRole, ConsulError> {
        acl::role_update(self, role)
    }

    async fn namespace_read(
        &self,
        name: &str,
        _opts: &QueryOptions,
    ) -> Result<Option<Namespace>, ConsulError> {
        config::namespace_read(self, name)
    }

    async fn namespace_create(
        &self,
        namespace: &Namespace,
        _opts: &WriteOptions,
    ) -> Result<Namespace, ConsulError> {
        config::namespace_create(self, namespace)
    }

    async fn assign_service_virtual_ip(
        &self,
        service: &str,
        manual_vips: &[String],
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        config::assign_service_virtual_ip(self, service, manual_vips, opts)
    }
}

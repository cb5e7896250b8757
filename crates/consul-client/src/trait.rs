//! ConsulClient trait for mocking
//!
//! The concrete [`ConsulClient`](crate::ConsulClient) implements this trait and
//! the controllers only ever hold a `dyn ConsulClientTrait`, so unit tests can
//! substitute the in-memory mock.

use crate::common::{QueryMeta, QueryOptions, WriteOptions};
use crate::error::ConsulError;
use crate::models::{
    AclPolicy, AclRole, CatalogDeregistration, CatalogRegistration, ConfigEntry, Namespace,
    ServiceTags,
};

/// Trait for Consul HTTP API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ConsulClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Config entries

    /// Read one config entry. A missing entry is [`ConsulError::NotFound`].
    async fn get_config_entry(
        &self,
        kind: &str,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<(ConfigEntry, QueryMeta), ConsulError>;

    /// Create or overwrite a config entry. Returns whether Consul applied it.
    async fn set_config_entry(
        &self,
        entry: &ConfigEntry,
        opts: &WriteOptions,
    ) -> Result<bool, ConsulError>;

    /// Delete a config entry.
    async fn delete_config_entry(
        &self,
        kind: &str,
        name: &str,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError>;

    // Catalog

    /// List services, blocking while `opts.wait_index` is current.
    async fn catalog_services(
        &self,
        opts: &QueryOptions,
    ) -> Result<(ServiceTags, QueryMeta), ConsulError>;

    /// Register a node/service/check.
    async fn catalog_register(
        &self,
        registration: &CatalogRegistration,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError>;

    /// Remove a service or check from the catalog.
    async fn catalog_deregister(
        &self,
        deregistration: &CatalogDeregistration,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError>;

    // ACL

    /// Read a policy by name; `None` when it does not exist.
    async fn acl_policy_read_by_name(
        &self,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<Option<AclPolicy>, ConsulError>;

    /// Create a policy and return it with its assigned ID.
    async fn acl_policy_create(
        &self,
        policy: &AclPolicy,
        opts: &WriteOptions,
    ) -> Result<AclPolicy, ConsulError>;

    /// Delete a policy by ID.
    async fn acl_policy_delete(&self, id: &str, opts: &WriteOptions) -> Result<(), ConsulError>;

    /// List all roles.
    async fn acl_role_list(&self, opts: &QueryOptions) -> Result<Vec<AclRole>, ConsulError>;

    /// Read a role by ID; `None` when it does not exist.
    async fn acl_role_read(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Option<AclRole>, ConsulError>;

    /// Replace a role.
    async fn acl_role_update(
        &self,
        role: &AclRole,
        opts: &WriteOptions,
    ) -> Result<AclRole, ConsulError>;

    // Namespaces

    /// Read a namespace; `None` when it does not exist.
    async fn namespace_read(
        &self,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<Option<Namespace>, ConsulError>;

    /// Create a namespace.
    async fn namespace_create(
        &self,
        namespace: &Namespace,
        opts: &WriteOptions,
    ) -> Result<Namespace, ConsulError>;

    // Virtual IPs

    /// Add manual virtual IPs for a service to the catalog's VIP table.
    async fn assign_service_virtual_ip(
        &self,
        service: &str,
        manual_vips: &[String],
        opts: &WriteOptions,
    ) -> Result<(), ConsulError>;
}

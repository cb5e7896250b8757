//! Generic config-entry reconciliation.
//!
//! One pass over a freshly fetched resource:
//!
//! 1. a deleting resource removes its Consul entry (only when this datacenter
//!    owns it) and then its finalizer;
//! 2. a new resource gets the finalizer and `Synced=Unknown`;
//! 3. the live entry is compared with the desired one and created, updated,
//!    migrated or left alone.
//!
//! Every failure that belongs to the resource is written to its status before
//! it is returned, so `kubectl get` shows why a sync is stuck.

use crate::error::ControllerError;
use crate::reconciler::{
    REASON_CONSUL_AGENT_ERROR, REASON_CONSUL_PATCH_ERROR, REASON_EXTERNALLY_MANAGED,
    REASON_MIGRATION_FAILED, Reconciler,
};
use crate::store::ResourceStore;
use chrono::Utc;
use consul_client::{ConfigEntry, namespaces};
use crds::{
    CONFIG_ENTRY_FINALIZER, ConditionStatus, ConfigEntryResource, has_finalizer, with_finalizer,
    without_finalizer,
};
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info};

impl Reconciler {
    /// Reconcile the config-entry resource `namespace/name`.
    ///
    /// A resource that no longer exists is a no-op.
    pub async fn reconcile_entry<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        let Some(mut resource) = store.get(Some(namespace), name).await? else {
            debug!("Resource no longer exists");
            return Ok(());
        };

        let consul_ns = self.consul_namespace_of(&resource);
        let finalizers = resource.finalizers().to_vec();

        if resource.meta().deletion_timestamp.is_some() {
            if has_finalizer(&finalizers, CONFIG_ENTRY_FINALIZER) {
                return self.delete_entry(store, &mut resource, &consul_ns).await;
            }
            return Ok(());
        }

        if !has_finalizer(&finalizers, CONFIG_ENTRY_FINALIZER) {
            let updated = with_finalizer(&finalizers, CONFIG_ENTRY_FINALIZER);
            if let Err(e) = store.patch_finalizers(&resource, &updated).await {
                let message = format!("adding finalizer: {e}");
                return self
                    .sync_failed(store, &mut resource, REASON_CONSUL_PATCH_ERROR, message, e)
                    .await;
            }
            resource.meta_mut().finalizers = Some(updated);
            self.write_synced(store, &mut resource, ConditionStatus::Unknown, "", String::new())
                .await?;
        }

        let desired = self.desired_entry(&resource, &consul_ns)?;
        let existing = match self
            .consul
            .get_config_entry(K::CONSUL_KIND, &desired.name, &self.query_options(&consul_ns))
            .await
        {
            Ok((entry, _)) => entry,
            Err(e) if e.is_not_found() => {
                return self.create_entry(store, &mut resource, &desired, &consul_ns).await;
            }
            Err(e) => {
                let message = e.to_string();
                return self
                    .sync_failed(store, &mut resource, REASON_CONSUL_AGENT_ERROR, message, e.into())
                    .await;
            }
        };

        let source_datacenter = existing.source_datacenter();
        let managed_by_this_dc = source_datacenter == self.settings.datacenter;
        let matches = resource.matches_consul(&existing)?;
        let has_migration_key = resource.has_migration_key();

        if !matches && !managed_by_this_dc && !has_migration_key {
            let message = if source_datacenter.is_empty() {
                "config entry already exists in Consul".to_string()
            } else {
                format!("config entry managed in different datacenter: {source_datacenter:?}")
            };
            let err = ControllerError::Reconciliation(message.clone());
            return self
                .sync_failed(store, &mut resource, REASON_EXTERNALLY_MANAGED, message, err)
                .await;
        }

        if !matches && has_migration_key {
            // Both sides go into the message so the user can see which fields differ.
            let message = format!(
                "migration failed: Kubernetes resource does not match existing Consul config entry: consul={}, kube={}",
                serde_json::to_string(&existing)?,
                serde_json::to_string(&desired)?,
            );
            let err = ControllerError::Reconciliation(message.clone());
            return self
                .sync_failed(store, &mut resource, REASON_MIGRATION_FAILED, message, err)
                .await;
        }

        if !matches || (has_migration_key && !managed_by_this_dc) {
            if matches {
                info!(datacenter = %source_datacenter, "Migrating config entry to be managed by Kubernetes");
            } else {
                info!(modify_index = existing.modify_index, "Config entry does not match Consul");
            }
            if let Err(e) = self
                .consul
                .set_config_entry(&desired, &self.write_options(&consul_ns))
                .await
            {
                let message = format!("updating config entry in consul: {e}");
                return self
                    .sync_unknown_with_error(store, &mut resource, message, e.into())
                    .await;
            }
            info!("Config entry updated");
            return self.sync_successful(store, &mut resource, &consul_ns).await;
        }

        if resource.synced_condition_status() != ConditionStatus::True {
            return self.sync_successful(store, &mut resource, &consul_ns).await;
        }

        self.assign_virtual_ip(&resource, &consul_ns).await;
        Ok(())
    }

    /// The entry to write, scoped to `consul_ns` and our partition.
    fn desired_entry<K: ConfigEntryResource>(
        &self,
        resource: &K,
        consul_ns: &str,
    ) -> Result<ConfigEntry, ControllerError> {
        let mut entry = resource.to_consul(&self.settings.datacenter)?;
        entry.namespace = consul_ns.to_string();
        entry.partition.clone_from(&self.settings.partition);
        Ok(entry)
    }

    async fn create_entry<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        resource: &mut K,
        desired: &ConfigEntry,
        consul_ns: &str,
    ) -> Result<(), ControllerError> {
        info!("Config entry not found in Consul");

        if self.settings.namespaces.enabled {
            match namespaces::ensure_exists(
                &*self.consul,
                consul_ns,
                &self.settings.cross_namespace_acl_policy,
                &self.settings.partition,
            )
            .await
            {
                Ok(true) => info!(namespace = %consul_ns, "Consul namespace created"),
                Ok(false) => {}
                Err(e) => {
                    let message = format!("creating consul namespace {consul_ns:?}: {e}");
                    return self
                        .sync_failed(store, resource, REASON_CONSUL_AGENT_ERROR, message, e.into())
                        .await;
                }
            }
        }

        if let Err(e) = self
            .consul
            .set_config_entry(desired, &self.write_options(consul_ns))
            .await
        {
            let message = format!("writing config entry to consul: {e}");
            return self
                .sync_failed(store, resource, REASON_CONSUL_AGENT_ERROR, message, e.into())
                .await;
        }

        info!("Config entry created");
        self.sync_successful(store, resource, consul_ns).await
    }

    async fn delete_entry<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        resource: &mut K,
        consul_ns: &str,
    ) -> Result<(), ControllerError> {
        info!("Deletion event");
        let name = resource.consul_name();

        match self
            .consul
            .get_config_entry(K::CONSUL_KIND, &name, &self.query_options(consul_ns))
            .await
        {
            Ok((entry, _)) if entry.source_datacenter() == self.settings.datacenter => {
                if let Err(e) = self
                    .consul
                    .delete_config_entry(K::CONSUL_KIND, &name, &self.write_options(consul_ns))
                    .await
                {
                    let message = format!("deleting config entry from consul: {e}");
                    return self
                        .sync_failed(store, resource, REASON_CONSUL_AGENT_ERROR, message, e.into())
                        .await;
                }
                info!("Deletion from Consul successful");
            }
            Ok((entry, _)) => {
                info!(
                    external_datacenter = %entry.source_datacenter(),
                    "Config entry was created in another datacenter, skipping delete from Consul"
                );
            }
            Err(e) if e.is_not_found() => debug!("Config entry already gone from Consul"),
            Err(e) => {
                let message = e.to_string();
                return self
                    .sync_failed(store, resource, REASON_CONSUL_AGENT_ERROR, message, e.into())
                    .await;
            }
        }

        let remaining = without_finalizer(resource.finalizers(), CONFIG_ENTRY_FINALIZER);
        store.patch_finalizers(resource, &remaining).await?;
        info!("Finalizer removed");
        Ok(())
    }

    /// Write a single `Synced` condition; `True` also stamps the sync time.
    async fn write_synced<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        resource: &mut K,
        status: ConditionStatus,
        reason: &str,
        message: String,
    ) -> Result<(), ControllerError> {
        let current = resource.status_mut();
        current.set_synced_condition(status, reason, message);
        if status != ConditionStatus::False {
            current.last_synced_time = Some(Utc::now());
        }
        let snapshot = current.clone();
        store.update_status(resource, &snapshot).await?;
        Ok(())
    }

    async fn sync_successful<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        resource: &mut K,
        consul_ns: &str,
    ) -> Result<(), ControllerError> {
        self.write_synced(store, resource, ConditionStatus::True, "", String::new())
            .await?;
        self.assign_virtual_ip(resource, consul_ns).await;
        Ok(())
    }

    /// Record `Synced=False` and return `err`, or the status error if the
    /// write itself fails.
    async fn sync_failed<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        resource: &mut K,
        reason: &str,
        message: String,
        err: ControllerError,
    ) -> Result<(), ControllerError> {
        if let Err(update_err) = self
            .write_synced(store, resource, ConditionStatus::False, reason, message)
            .await
        {
            error!(error = %err, "Sync failed");
            return Err(update_err);
        }
        Err(err)
    }

    /// An update whose outcome in Consul is unknown.
    async fn sync_unknown_with_error<K: ConfigEntryResource>(
        &self,
        store: &dyn ResourceStore<K>,
        resource: &mut K,
        message: String,
        err: ControllerError,
    ) -> Result<(), ControllerError> {
        if let Err(update_err) = self
            .write_synced(
                store,
                resource,
                ConditionStatus::Unknown,
                REASON_CONSUL_AGENT_ERROR,
                message,
            )
            .await
        {
            error!(error = %err, "Sync status unknown");
            return Err(update_err);
        }
        Err(err)
    }
}

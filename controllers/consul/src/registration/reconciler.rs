//! Registration reconcile and deregistration consumer.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::registration::acl::{link_gateways, policy_name, unlink_gateways};
use crate::registration::cache::RegistrationCache;
use crate::registration::{
    REASON_CONSUL_DEREGISTERED, REASON_CONSUL_ERROR_ACL, REASON_CONSUL_ERROR_DEREGISTRATION,
    REASON_CONSUL_ERROR_REGISTRATION, REASON_SYNC_ERROR, RegistrationSettings,
};
use crate::store::ResourceStore;
use chrono::Utc;
use consul_client::ConsulClientTrait;
use crds::{
    CONDITION_ACLS_UPDATED, CONDITION_DEREGISTERED, CONDITION_REGISTERED, CONDITION_SYNCED,
    Condition, ConditionStatus, REGISTRATION_FINALIZER, Registration, SyncStatus,
    TerminatingGateway, has_finalizer, with_finalizer, without_finalizer,
};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What one pass achieved; `None` means the step succeeded or was skipped.
#[derive(Debug, Default)]
struct Outcome {
    registering: bool,
    finalizer: Option<ControllerError>,
    catalog: Option<ControllerError>,
    acl: Option<ControllerError>,
    acl_attempted: bool,
}

impl Outcome {
    fn registering() -> Self {
        Self {
            registering: true,
            ..Default::default()
        }
    }

    fn deregistering() -> Self {
        Self::default()
    }

    fn has_errors(&self) -> bool {
        self.finalizer.is_some() || self.catalog.is_some() || self.acl.is_some()
    }

    fn first_error_message(&self) -> String {
        [&self.finalizer, &self.catalog, &self.acl]
            .into_iter()
            .flatten()
            .next()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::with_capacity(3);
        conditions.push(if self.has_errors() {
            Condition::new(
                CONDITION_SYNCED,
                ConditionStatus::False,
                REASON_SYNC_ERROR,
                self.first_error_message(),
            )
        } else {
            Condition::ok(CONDITION_SYNCED)
        });

        let (type_, reason) = if self.registering {
            (CONDITION_REGISTERED, REASON_CONSUL_ERROR_REGISTRATION)
        } else {
            (CONDITION_DEREGISTERED, REASON_CONSUL_ERROR_DEREGISTRATION)
        };
        conditions.push(match (&self.finalizer, &self.catalog) {
            (_, Some(e)) => Condition::new(type_, ConditionStatus::False, reason, e.to_string()),
            // Finalizer could not be added, so the catalog was never called.
            (Some(e), None) if self.registering => {
                Condition::new(type_, ConditionStatus::Unknown, REASON_SYNC_ERROR, e.to_string())
            }
            _ => Condition::ok(type_),
        });

        if self.acl_attempted {
            conditions.push(match &self.acl {
                Some(e) => Condition::new(
                    CONDITION_ACLS_UPDATED,
                    ConditionStatus::False,
                    REASON_CONSUL_ERROR_ACL,
                    e.to_string(),
                ),
                None => Condition::ok(CONDITION_ACLS_UPDATED),
            });
        }
        conditions
    }

    fn into_result(self) -> Result<(), ControllerError> {
        let errors = [self.finalizer, self.catalog, self.acl]
            .into_iter()
            .flatten()
            .collect();
        ControllerError::join(errors).map_or(Ok(()), Err)
    }
}

/// Reconciles Registrations against the Consul catalog.
pub struct RegistrationReconciler {
    consul: Arc<dyn ConsulClientTrait>,
    cache: Arc<RegistrationCache>,
    registrations: Arc<dyn ResourceStore<Registration>>,
    gateways: Arc<dyn ResourceStore<TerminatingGateway>>,
    metrics: Arc<Metrics>,
    settings: RegistrationSettings,
}

impl std::fmt::Debug for RegistrationReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationReconciler")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RegistrationReconciler {
    /// Creates a new reconciler.
    pub fn new(
        consul: Arc<dyn ConsulClientTrait>,
        cache: Arc<RegistrationCache>,
        registrations: Arc<dyn ResourceStore<Registration>>,
        gateways: Arc<dyn ResourceStore<TerminatingGateway>>,
        metrics: Arc<Metrics>,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            consul,
            cache,
            registrations,
            gateways,
            metrics,
            settings,
        }
    }

    /// Reconcile the Registration `name`.
    pub async fn reconcile(&self, name: &str) -> Result<(), ControllerError> {
        let Some(mut registration) = self.registrations.get(None, name).await? else {
            debug!("Registration no longer exists");
            return Ok(());
        };

        if registration.meta().deletion_timestamp.is_some() {
            if !has_finalizer(registration.finalizers(), REGISTRATION_FINALIZER) {
                return Ok(());
            }
            return self.handle_deletion(&mut registration).await;
        }

        let service = registration.service_name().to_string();
        let deregistered = registration
            .status
            .as_ref()
            .is_some_and(|s| s.condition(CONDITION_DEREGISTERED).is_some());
        if deregistered {
            if let Some(cached) = self.cache.get(&service) {
                if registration.equal_except_status(&cached) {
                    // Consul dropped the service and the status already says so.
                    self.cache.set(&service, registration);
                    info!(%service, "Registration is in sync");
                    return Ok(());
                }
            }
        }

        self.handle_registration(&mut registration).await
    }

    async fn handle_registration(&self, registration: &mut Registration) -> Result<(), ControllerError> {
        info!(service = %registration.service_name(), "Registering service");
        let mut outcome = Outcome::registering();

        let finalizers = registration.finalizers().to_vec();
        if !has_finalizer(&finalizers, REGISTRATION_FINALIZER) {
            let updated = with_finalizer(&finalizers, REGISTRATION_FINALIZER);
            match self.registrations.patch_finalizers(registration, &updated).await {
                Ok(()) => registration.meta_mut().finalizers = Some(updated),
                Err(e) => {
                    outcome.finalizer = Some(ControllerError::Reconciliation(format!(
                        "adding finalizer: {e}"
                    )));
                    return self.finish(registration, outcome).await;
                }
            }
        }

        if let Err(e) = self.cache.register_service(registration).await {
            outcome.catalog = Some(e);
            return self.finish(registration, outcome).await;
        }

        if self.settings.acls_enabled {
            outcome.acl_attempted = true;
            if let Err(e) = self.link_acls(registration).await {
                outcome.acl = Some(e);
            }
        }

        self.finish(registration, outcome).await
    }

    async fn handle_deletion(&self, registration: &mut Registration) -> Result<(), ControllerError> {
        info!(service = %registration.service_name(), "Deregistering service");
        let mut outcome = Outcome::deregistering();

        if let Err(e) = self.cache.deregister_service(registration).await {
            outcome.catalog = Some(e);
            return self.finish(registration, outcome).await;
        }

        if self.settings.acls_enabled {
            outcome.acl_attempted = true;
            if let Err(e) = self.unlink_acls(registration).await {
                outcome.acl = Some(e);
            }
        }

        if outcome.has_errors() {
            return self.finish(registration, outcome).await;
        }

        let written = self.write_status(registration, &outcome).await?;
        let remaining = without_finalizer(written.finalizers(), REGISTRATION_FINALIZER);
        self.registrations.patch_finalizers(&written, &remaining).await?;
        info!("Finalizer removed");
        Ok(())
    }

    async fn linked_gateways(&self, registration: &Registration) -> Result<Vec<TerminatingGateway>, ControllerError> {
        Ok(self
            .gateways
            .list()
            .await?
            .into_iter()
            .filter(|gw| gw.links_service(registration.service_name(), registration.service_namespace()))
            .collect())
    }

    async fn link_acls(&self, registration: &Registration) -> Result<(), ControllerError> {
        let gateways = self.linked_gateways(registration).await?;
        link_gateways(&*self.consul, registration, &gateways, &self.settings).await
    }

    async fn unlink_acls(&self, registration: &Registration) -> Result<(), ControllerError> {
        if self.policy_shared(registration).await? {
            debug!(
                service = %registration.service_name(),
                "Another Registration uses the write policy, leaving gateway roles alone"
            );
            return Ok(());
        }
        let gateways = self.linked_gateways(registration).await?;
        unlink_gateways(&*self.consul, registration, &gateways).await
    }

    /// Whether a live Registration other than `registration` maps to the same
    /// write policy.
    async fn policy_shared(&self, registration: &Registration) -> Result<bool, ControllerError> {
        let name = registration.name_any();
        let policy = policy_name(registration.service_name(), registration.service_namespace());
        Ok(self.registrations.list().await?.iter().any(|other| {
            other.name_any() != name
                && other.meta().deletion_timestamp.is_none()
                && policy_name(other.service_name(), other.service_namespace()) == policy
        }))
    }

    /// Write the outcome to the status and return its joined errors.
    async fn finish(&self, registration: &mut Registration, outcome: Outcome) -> Result<(), ControllerError> {
        if let Err(e) = self.write_status(registration, &outcome).await {
            error!(error = %e, "Failed to update Registration status");
        }
        outcome.into_result()
    }

    /// Returns the Registration as stored after the write.
    async fn write_status(&self, registration: &mut Registration, outcome: &Outcome) -> Result<Registration, ControllerError> {
        let status = registration.status.get_or_insert_with(SyncStatus::default);
        status.set_conditions(outcome.conditions());
        status.last_synced_time = Some(Utc::now());
        let snapshot = status.clone();
        self.registrations.update_status(registration, &snapshot).await
    }

    /// Mark every Registration of `service` as deregistered by Consul.
    pub async fn mark_deregistered(&self, service: &str) -> Result<(), ControllerError> {
        let registrations = self.registrations.list().await?;
        for mut registration in registrations.into_iter().filter(|r| r.service_name() == service) {
            let status = registration.status.get_or_insert_with(SyncStatus::default);
            status.set_conditions(vec![
                Condition::ok(CONDITION_SYNCED),
                Condition::new(
                    CONDITION_DEREGISTERED,
                    ConditionStatus::True,
                    REASON_CONSUL_DEREGISTERED,
                    "",
                ),
            ]);
            status.last_synced_time = Some(Utc::now());
            let snapshot = status.clone();
            if let Err(e) = self.registrations.update_status(&registration, &snapshot).await {
                error!(name = %registration.name_any(), error = %e, "Failed to update Registration status");
                continue;
            }
            self.metrics.record_deregistration();
        }
        Ok(())
    }

    /// Consume service names from the cache's deregistration channel until
    /// `shutdown` fires or the channel closes.
    pub async fn watch_for_deregistrations(&self, mut rx: mpsc::Receiver<String>, shutdown: CancellationToken) {
        loop {
            let service = tokio::select! {
                () = shutdown.cancelled() => return,
                received = rx.recv() => match received {
                    Some(service) => service,
                    None => return,
                },
            };
            if let Err(e) = self.mark_deregistered(&service).await {
                error!(%service, error = %e, "Error listing registrations by service name");
            }
        }
    }
}

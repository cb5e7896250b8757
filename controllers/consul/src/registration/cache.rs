//! Registration cache and catalog watch loop.
//!
//! The cache maps a service name to the Registration that put it in the
//! catalog. One watch loop per Consul namespace long-polls the catalog and
//! diffs it against the cache:
//!
//! - cached services missing from the catalog were removed behind our back,
//!   they leave the cache and their names go to the deregistration channel;
//! - catalog services missing from the cache (after a restart, typically) are
//!   matched to Registrations and cached.
//!
//! The first completed pass of the default loop opens the initial-sync gate.

use crate::backoff::{BASE_DELAY, ExponentialBackoff, MAX_DELAY};
use crate::error::ControllerError;
use crate::registration::{
    CONSUL_SERVICE, DEREGISTRATION_CHANNEL_CAPACITY, NOT_IN_SERVICE_MESH_FILTER,
    RegistrationSettings, is_default_namespace,
};
use crate::store::ResourceStore;
use consul_client::{ConsulClientTrait, QueryOptions, ServiceTags, WriteOptions};
use crds::Registration;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct CacheState {
    services: HashMap<String, Registration>,
    namespaces: HashSet<String>,
}

/// Services this controller registered, by service name.
pub struct RegistrationCache {
    consul: Arc<dyn ConsulClientTrait>,
    registrations: Arc<dyn ResourceStore<Registration>>,
    settings: RegistrationSettings,
    state: Mutex<CacheState>,
    deregistrations: mpsc::Sender<String>,
    synced: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RegistrationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCache")
            .field("consul", &self.consul.base_url())
            .field("settings", &self.settings)
            .field("synced", &*self.synced.borrow())
            .finish_non_exhaustive()
    }
}

impl RegistrationCache {
    /// Creates the cache and the receiving end of its deregistration channel.
    ///
    /// Watch loops stop when `shutdown` is cancelled.
    pub fn new(
        consul: Arc<dyn ConsulClientTrait>,
        registrations: Arc<dyn ResourceStore<Registration>>,
        settings: RegistrationSettings,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(DEREGISTRATION_CHANNEL_CAPACITY);
        let (synced, _) = watch::channel(false);
        let cache = Arc::new(Self {
            consul,
            registrations,
            settings,
            state: Mutex::new(CacheState::default()),
            deregistrations: tx,
            synced,
            shutdown,
        });
        (cache, rx)
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the watch loop for the default namespace.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.state().namespaces.insert(String::new());
        tokio::spawn(Arc::clone(self).run(String::new(), self.shutdown.child_token()))
    }

    /// Receiver that turns `true` once the first catalog pass completed.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    /// Wait for the first catalog pass, or for shutdown.
    pub async fn wait_synced(&self) {
        let mut ready = self.ready();
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            _ = ready.wait_for(|synced| *synced) => {}
        }
    }

    /// Cached registration for `service`.
    pub fn get(&self, service: &str) -> Option<Registration> {
        self.state().services.get(service).cloned()
    }

    /// Cache `registration` under `service`.
    pub fn set(&self, service: &str, registration: Registration) {
        self.state().services.insert(service.to_string(), registration);
    }

    /// Namespaces with a running watch loop.
    pub fn watched_namespaces(&self) -> HashSet<String> {
        self.state().namespaces.clone()
    }

    /// Long-poll the catalog of `namespace` until `token` is cancelled.
    ///
    /// A failed poll is retried after an exponential backoff (200ms doubling
    /// up to 5s) so an unreachable agent is not hammered; the first successful
    /// poll resets it.
    pub async fn run(self: Arc<Self>, namespace: String, token: CancellationToken) {
        info!(namespace = %namespace, "Starting catalog watch");
        let mut opts = QueryOptions {
            namespace: namespace.clone(),
            partition: self.settings.partition.clone(),
            filter: NOT_IN_SERVICE_MESH_FILTER.to_string(),
            ..Default::default()
        };
        let mut backoff = ExponentialBackoff::new(BASE_DELAY, MAX_DELAY);

        loop {
            let result = tokio::select! {
                () = token.cancelled() => break,
                result = self.consul.catalog_services(&opts) => result,
            };

            let (services, meta) = match result {
                Ok(listing) => listing,
                Err(e) => {
                    // Long polls time out and agents restart; only log the rest.
                    if e.is_transient() {
                        debug!(namespace = %namespace, error = %e, "Catalog poll interrupted");
                    } else {
                        error!(namespace = %namespace, error = %e, "Error fetching registrations");
                    }
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(backoff.next_backoff()) => continue,
                    }
                }
            };
            backoff.reset();

            if !self.sync_once(&services, &token).await {
                break;
            }
            debug!(namespace = %namespace, index = meta.last_index, "Synced registrations with Consul");
            opts.wait_index = meta.last_index;

            self.synced.send_if_modified(|synced| {
                if *synced {
                    return false;
                }
                info!("Initial sync complete");
                *synced = true;
                true
            });
        }
        info!(namespace = %namespace, "Catalog watch stopped");
    }

    /// Diff one catalog listing against the cache. Returns `false` when
    /// cancelled while waiting on the deregistration channel.
    pub(crate) async fn sync_once(&self, catalog: &ServiceTags, token: &CancellationToken) -> bool {
        let (removed, added) = {
            let mut state = self.state();
            let removed: Vec<String> = state
                .services
                .keys()
                .filter(|service| !catalog.contains_key(*service))
                .cloned()
                .collect();
            // Dropped here so the next listing does not report them again.
            for service in &removed {
                state.services.remove(service);
            }
            let added: Vec<String> = catalog
                .keys()
                .filter(|service| !state.services.contains_key(*service) && *service != CONSUL_SERVICE)
                .cloned()
                .collect();
            (removed, added)
        };

        for service in removed {
            info!(%service, "Consul deregistered service");
            tokio::select! {
                () = token.cancelled() => return false,
                sent = self.deregistrations.send(service) => {
                    if sent.is_err() {
                        warn!("Deregistration consumer is gone");
                    }
                }
            }
        }

        if added.is_empty() {
            return true;
        }
        let registrations = match self.registrations.list().await {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, "Error listing registrations");
                return true;
            }
        };
        for service in added {
            info!(%service, "Consul registered service");
            let mut found = false;
            for registration in registrations.iter().filter(|r| r.service_name() == service) {
                found = true;
                self.set(&service, registration.clone());
            }
            if !found {
                info!(%service, "Registration not found in Kubernetes");
            }
        }
        true
    }

    /// Register `registration` in the catalog unless the cached copy already
    /// matches it.
    pub async fn register_service(self: &Arc<Self>, registration: &Registration) -> Result<(), ControllerError> {
        let service = registration.service_name();
        if let Some(cached) = self.get(service) {
            if registration.equal_except_status(&cached) {
                debug!(%service, "Service already registered");
                return Ok(());
            }
        }

        let request = registration.to_catalog_registration()?;
        let opts = WriteOptions::namespaced(registration.service_namespace())
            .with_partition(&registration.spec.service.partition);
        if let Err(e) = self.consul.catalog_register(&request, &opts).await {
            error!(%service, error = %e, "Error registering service");
            return Err(e.into());
        }

        self.set(service, registration.clone());
        self.watch_namespace(registration.service_namespace());
        info!(%service, "Successfully registered service");
        Ok(())
    }

    /// Remove `registration` from the catalog and the cache.
    pub async fn deregister_service(&self, registration: &Registration) -> Result<(), ControllerError> {
        let request = registration.to_catalog_deregistration();
        let opts = WriteOptions::namespaced(registration.service_namespace())
            .with_partition(&registration.spec.service.partition);
        if let Err(e) = self.consul.catalog_deregister(&request, &opts).await {
            error!(service_id = %request.service_id, error = %e, "Error deregistering service");
            return Err(e.into());
        }

        self.state().services.remove(registration.service_name());
        info!(service_id = %request.service_id, "Successfully deregistered service");
        Ok(())
    }

    /// Start a watch loop for `namespace` unless one is running.
    fn watch_namespace(self: &Arc<Self>, namespace: &str) {
        if is_default_namespace(namespace) {
            return;
        }
        let mut state = self.state();
        if state.namespaces.insert(namespace.to_string()) {
            tokio::spawn(Arc::clone(self).run(namespace.to_string(), self.shutdown.child_token()));
        }
    }
}

//! Main controller implementation.
//!
//! Wires the Consul client, the Kubernetes stores and the reconcilers
//! together and runs:
//! - one watcher per config-entry kind
//! - the registration cache's catalog watch
//! - the Registration watcher and deregistration consumer, once the cache has
//!   completed its first catalog pass
//! - the probe and metrics server

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, SyncSettings};
use crate::registration::RegistrationSettings;
use crate::registration::cache::RegistrationCache;
use crate::registration::reconciler::RegistrationReconciler;
use crate::store::{KubeServiceDirectory, KubeStore, ResourceStore, ServiceDirectory};
use crate::watcher::Watcher;
use consul_client::{ConsulClient, ConsulClientTrait};
use crds::{
    ConfigEntryResource, ControlPlaneRequestLimit, ExportedServices, IngressGateway, Mesh,
    ProxyDefaults, Registration, SamenessGroup, ServiceDefaults, ServiceIntentions,
    ServiceResolver, ServiceRouter, ServiceSplitter, TerminatingGateway,
};
use futures::future::select_all;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type Task = JoinHandle<Result<(), ControllerError>>;

/// Main controller for Consul config entries and registrations.
#[derive(Debug)]
pub struct Controller {
    tasks: Vec<(&'static str, Task)>,
    shutdown: CancellationToken,
}

fn spawn_entry_watcher<K: ConfigEntryResource>(
    watcher: &Arc<Watcher>,
    reconciler: &Arc<Reconciler>,
) -> (&'static str, Task) {
    let watcher = Arc::clone(watcher);
    let reconciler = Arc::clone(reconciler);
    (
        K::CONSUL_KIND,
        tokio::spawn(async move { watcher.watch_config_entries::<K>(reconciler).await }),
    )
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Consul Controller");

        let kube_client = Client::try_default().await?;
        let consul: Arc<dyn ConsulClientTrait> = Arc::new(ConsulClient::new(
            config.consul_address.clone(),
            config.consul_token.clone(),
        )?);
        let metrics = Arc::new(Metrics::new()?);
        let shutdown = CancellationToken::new();

        let services: Arc<dyn ServiceDirectory> =
            Arc::new(KubeServiceDirectory::new(kube_client.clone()));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&consul),
            services,
            SyncSettings::from(&config),
        ));
        let watcher = Arc::new(Watcher::new(
            kube_client.clone(),
            config.watch_namespace.clone(),
            Arc::clone(&metrics),
            shutdown.clone(),
        ));

        let mut tasks = vec![
            spawn_entry_watcher::<ServiceDefaults>(&watcher, &reconciler),
            spawn_entry_watcher::<ServiceResolver>(&watcher, &reconciler),
            spawn_entry_watcher::<ServiceRouter>(&watcher, &reconciler),
            spawn_entry_watcher::<ServiceSplitter>(&watcher, &reconciler),
            spawn_entry_watcher::<ServiceIntentions>(&watcher, &reconciler),
            spawn_entry_watcher::<ProxyDefaults>(&watcher, &reconciler),
            spawn_entry_watcher::<Mesh>(&watcher, &reconciler),
            spawn_entry_watcher::<IngressGateway>(&watcher, &reconciler),
            spawn_entry_watcher::<TerminatingGateway>(&watcher, &reconciler),
            spawn_entry_watcher::<ExportedServices>(&watcher, &reconciler),
            spawn_entry_watcher::<SamenessGroup>(&watcher, &reconciler),
            spawn_entry_watcher::<ControlPlaneRequestLimit>(&watcher, &reconciler),
        ];

        // Registrations
        let settings = RegistrationSettings::from(&config);
        let registrations: Arc<dyn ResourceStore<Registration>> =
            Arc::new(KubeStore::<Registration>::cluster(kube_client.clone()));
        let gateways: Arc<dyn ResourceStore<TerminatingGateway>> =
            Arc::new(KubeStore::<TerminatingGateway>::namespaced(kube_client));
        let (cache, deregistrations) = RegistrationCache::new(
            Arc::clone(&consul),
            Arc::clone(&registrations),
            settings.clone(),
            shutdown.clone(),
        );
        let registration_reconciler = Arc::new(RegistrationReconciler::new(
            consul,
            Arc::clone(&cache),
            registrations,
            gateways,
            Arc::clone(&metrics),
            settings,
        ));

        let catalog_watch = cache.start();
        tasks.push((
            "catalog-watch",
            tokio::spawn(async move {
                catalog_watch
                    .await
                    .map_err(|e| ControllerError::Watch(format!("catalog watch task failed: {e}")))
            }),
        ));

        tasks.push(("registration", {
            let cache = Arc::clone(&cache);
            let watcher = Arc::clone(&watcher);
            let reconciler = Arc::clone(&registration_reconciler);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                cache.wait_synced().await;
                if shutdown.is_cancelled() {
                    return Ok(());
                }
                watcher.watch_registrations(reconciler).await
            })
        }));

        let cache_ready = cache.ready();
        tasks.push(("deregistration", {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                cache.wait_synced().await;
                registration_reconciler
                    .watch_for_deregistrations(deregistrations, shutdown)
                    .await;
                Ok(())
            })
        }));

        tasks.push((
            "probes",
            tokio::spawn(health::serve(
                config.probe_addr,
                health::router(cache_ready, Arc::clone(&metrics)),
                shutdown.clone(),
            )),
        ));

        Ok(Self { tasks, shutdown })
    }

    /// Runs until a task stops or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!(tasks = self.tasks.len(), "Consul Controller running");
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();

        tokio::select! {
            (result, index, remaining) = select_all(handles) => {
                self.shutdown.cancel();
                let name = names.get(index).copied().unwrap_or("unknown");
                for handle in remaining {
                    handle.abort();
                }
                match result {
                    Ok(Ok(())) => {
                        error!(task = name, "Task stopped unexpectedly");
                        Err(ControllerError::Watch(format!("{name} stopped unexpectedly")))
                    }
                    Ok(Err(e)) => {
                        error!(task = name, error = %e, "Task failed");
                        Err(ControllerError::Watch(format!("{name} failed: {e}")))
                    }
                    Err(e) => {
                        error!(task = name, error = %e, "Task panicked");
                        Err(ControllerError::Watch(format!("{name} task failed: {e}")))
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received");
                self.shutdown.cancel();
                Ok(())
            }
        }
    }
}

//! Consul Controller
//!
//! Syncs Consul state from Kubernetes custom resources:
//! - config entries (ServiceDefaults, ServiceRouter, Mesh, ...) are written to
//!   Consul and kept there while the resource exists
//! - Registrations put services running outside the mesh into the Consul
//!   catalog, optionally linking them to terminating gateway ACL roles
//!
//! Configuration comes from the environment, see [`config::ControllerConfig`].

mod backoff;
mod config;
mod controller;
mod error;
mod health;
mod metrics;
mod reconciler;
mod registration;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls backend needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting Consul Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Consul address: {}", config.consul_address);
    info!("  Datacenter: {}", config.datacenter);
    info!("  ACLs: {}", if config.acls_enabled() { "enabled" } else { "disabled" });
    info!(
        "  Partition: {}",
        if config.partitions_enabled() { config.partition.as_str() } else { "none" }
    );
    info!("  Consul namespaces: {}", config.namespaces.enabled);
    info!(
        "  Watch namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Probe address: {}", config.probe_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    info!("Consul Controller stopped");
    Ok(())
}

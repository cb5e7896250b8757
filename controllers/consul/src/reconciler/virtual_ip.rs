//! Manual virtual IPs.
//!
//! Transparent proxies resolve upstreams through Consul's virtual IP table.
//! For kinds that shape a service's discovery chain the controller copies the
//! cluster IP of the same-named Kubernetes Service into that table, so the
//! chain has a real address before the endpoints controller registers one.
//! None of this is allowed to fail the reconcile.

use crate::reconciler::Reconciler;
use crds::ConfigEntryResource;
use kube::ResourceExt;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Forward the matching Service's cluster IP to Consul, logging failures.
    pub(crate) async fn assign_virtual_ip<K: ConfigEntryResource>(
        &self,
        resource: &K,
        consul_namespace: &str,
    ) {
        if !resource.needs_virtual_ip() {
            return;
        }

        let namespace = resource.namespace().unwrap_or_default();
        let service = resource.kubernetes_name();
        let cluster_ip = match self.services.cluster_ip(&namespace, &service).await {
            Ok(Some(ip)) => ip,
            Ok(None) => {
                debug!(%service, "No Service with a cluster IP, skipping virtual IP");
                return;
            }
            Err(e) => {
                warn!(%service, error = %e, "Failed to look up Service for virtual IP");
                return;
            }
        };

        let consul_name = resource.consul_name();
        match self
            .consul
            .assign_service_virtual_ip(
                &consul_name,
                std::slice::from_ref(&cluster_ip),
                &self.write_options(consul_namespace),
            )
            .await
        {
            Ok(()) => info!(service = %consul_name, ip = %cluster_ip, "Added manual IP to virtual IP table"),
            Err(e) if e.is_not_found() => {
                warn!(service = %consul_name, "Consul does not support manual virtual IPs, upgrade to 1.16 or later");
            }
            Err(e) => warn!(service = %consul_name, error = %e, "Failed to assign virtual IP"),
        }
    }
}

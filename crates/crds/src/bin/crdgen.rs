//! Print every CRD manifest as a YAML stream.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > deploy/crds.yaml
//! ```

use anyhow::Context;
use crds::{
    ControlPlaneRequestLimit, ExportedServices, IngressGateway, Mesh, ProxyDefaults, Registration,
    SamenessGroup, ServiceDefaults, ServiceIntentions, ServiceResolver, ServiceRouter,
    ServiceSplitter, TerminatingGateway,
};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        ServiceDefaults::crd(),
        ServiceResolver::crd(),
        ServiceRouter::crd(),
        ServiceSplitter::crd(),
        ServiceIntentions::crd(),
        ProxyDefaults::crd(),
        Mesh::crd(),
        IngressGateway::crd(),
        TerminatingGateway::crd(),
        ExportedServices::crd(),
        SamenessGroup::crd(),
        ControlPlaneRequestLimit::crd(),
        Registration::crd(),
    ];

    for crd in &crds {
        let name = crd.metadata.name.as_deref().unwrap_or_default();
        let yaml = serde_yaml::to_string(crd).with_context(|| format!("serializing CRD {name}"))?;
        print!("---\n{yaml}");
    }
    Ok(())
}

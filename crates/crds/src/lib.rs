//! Consul CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Consul controllers: one CRD
//! per Consul config-entry kind plus the cluster-scoped `Registration`.
//!
//! Every config-entry kind implements [`ConfigEntryResource`], which is all
//! the reconciler needs to sync it.

pub mod conditions;
pub mod config_entry;
pub mod consul_json;
pub mod duration;
pub mod error;
pub mod finalizers;
pub mod shared;

pub mod control_plane_request_limit;
pub mod exported_services;
pub mod ingress_gateway;
pub mod mesh;
pub mod proxy_defaults;
pub mod registration;
pub mod sameness_group;
pub mod service_defaults;
pub mod service_intentions;
pub mod service_resolver;
pub mod service_router;
pub mod service_splitter;
pub mod terminating_gateway;

#[cfg(test)]
mod test_utils;

pub use conditions::*;
pub use config_entry::*;
pub use error::CrdError;
pub use finalizers::*;
pub use shared::*;

pub use control_plane_request_limit::*;
pub use exported_services::*;
pub use ingress_gateway::*;
pub use mesh::*;
pub use proxy_defaults::*;
pub use registration::*;
pub use sameness_group::*;
pub use service_defaults::*;
pub use service_intentions::*;
pub use service_resolver::*;
pub use service_router::*;
pub use service_splitter::*;
pub use terminating_gateway::*;

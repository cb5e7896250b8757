//! Consul HTTP API Client
//!
//! A Rust client for the parts of the Consul HTTP API that the Kubernetes
//! controllers drive: config entries, the service catalog, ACL policies and
//! roles, namespaces and the virtual IP table.
//!
//! # Example
//!
//! ```no_run
//! use consul_client::{ConsulClient, ConsulClientTrait, QueryOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ConsulClient::new("http://consul-server:8500".to_string(), None)?;
//!
//! // Read a config entry; a missing entry is a typed `ConsulError::NotFound`
//! let (entry, _meta) = client
//!     .get_config_entry("service-defaults", "web", &QueryOptions::default())
//!     .await?;
//! println!("{} owned by {:?}", entry.name, entry.source_datacenter());
//!
//! // Blocking query on the service catalog
//! let (services, meta) = client.catalog_services(&QueryOptions::default()).await?;
//! println!("{} services at index {}", services.len(), meta.last_index);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `test-util`: exposes [`MockConsulClient`], an in-memory agent for tests

pub mod client;
pub mod common;
pub mod error;
pub mod models;
pub mod namespaces;
#[path = "trait.rs"]
pub mod consul_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ConsulClient;
pub use common::{QueryMeta, QueryOptions, WriteOptions};
pub use consul_trait::ConsulClientTrait;
pub use error::ConsulError;
pub use models::*;
pub use namespaces::NamespaceMapping;
#[cfg(feature = "test-util")]
pub use mock::{MockConsulClient, MockFailure, MockOperation};

//! Registration CRD
//!
//! Registers a service that runs outside Kubernetes into the Consul catalog.
//! Cluster-scoped: the service's Consul namespace is part of the spec.

use crate::conditions::SyncStatus;
use crate::duration::{format_duration, parse_duration};
use crate::error::CrdError;
use consul_client::{
    AgentCheck, AgentService, CatalogDeregistration, CatalogRegistration, HealthCheckDefinition,
    Locality, ServiceAddress, Weights,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finalizer guarding a Registration's catalog entry.
pub const REGISTRATION_FINALIZER: &str = "registration.finalizers.consul.hashicorp.com";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "Registration",
    status = "SyncStatus",
    shortname = "registration",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSpec {
    /// Node ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Node the service runs on
    pub node: String,

    /// Node address
    pub address: String,

    /// Node tagged addresses
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tagged_addresses: BTreeMap<String, String>,

    /// Node meta
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_meta: BTreeMap<String, String>,

    /// Datacenter, defaults to the agent's
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,

    /// The service
    pub service: RegistrationService,

    /// Leave the node entry untouched
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_node_update: bool,

    /// Admin partition of the node
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<RegistrationCheck>,

    /// Node locality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<RegistrationLocality>,
}

/// Service being registered.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationService {
    /// Instance ID, defaults to the name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Service name
    pub name: String,

    /// Tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Service meta
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    /// Port
    #[serde(default)]
    pub port: i32,

    /// Address, defaults to the node's
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    /// Unix socket path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub socket_path: String,

    /// Tagged addresses
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tagged_addresses: BTreeMap<String, RegistrationServiceAddress>,

    /// DNS weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<RegistrationWeights>,

    /// Allow tag changes through anti-entropy
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enable_tag_override: bool,

    /// Service locality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<RegistrationLocality>,

    /// Consul namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Admin partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// A tagged service address.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationServiceAddress {
    /// Address
    pub address: String,
    /// Port
    #[serde(default)]
    pub port: i32,
}

/// DNS weights.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationWeights {
    /// Weight while passing
    pub passing: i32,
    /// Weight while warning
    pub warning: i32,
}

/// Region and zone.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLocality {
    /// Region
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    /// Zone
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
}

/// Health check registered with the service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCheck {
    /// Check ID
    pub check_id: String,

    /// Check name
    pub name: String,

    /// Initial status
    pub status: String,

    /// Notes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,

    /// Output
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Instance the check belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,

    /// Check type
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "type")]
    pub check_type: String,

    /// Exposed port
    #[serde(default)]
    pub exposed_port: i32,

    /// How the check runs
    pub definition: RegistrationCheckDefinition,
}

/// How a check runs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCheckDefinition {
    /// HTTP endpoint
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub http: String,

    /// TCP endpoint
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tcp: String,

    /// gRPC endpoint
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub grpc: String,

    /// Use TLS for gRPC
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub grpc_use_tls: bool,

    /// HTTP method
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    /// HTTP headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, Vec<String>>,

    /// HTTP body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,

    /// TLS server name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_server_name: String,

    /// Skip TLS verification
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tls_skip_verify: bool,

    /// Run interval, required
    pub interval_duration: String,

    /// Per-run timeout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout_duration: String,

    /// Remove the service after it has been critical this long
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deregister_critical_service_after_duration: String,
}

fn optional_duration(
    value: &str,
    error: impl Fn(String) -> CrdError,
) -> Result<String, CrdError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    parse_duration(value)
        .map(format_duration)
        .map_err(|_| error(value.to_string()))
}

fn locality(l: Option<&RegistrationLocality>) -> Option<Locality> {
    l.map(|l| Locality {
        region: l.region.clone(),
        zone: l.zone.clone(),
    })
}

impl RegistrationCheckDefinition {
    fn to_consul(&self) -> Result<HealthCheckDefinition, CrdError> {
        let interval = parse_duration(&self.interval_duration)
            .map_err(|_| CrdError::InvalidInterval(self.interval_duration.clone()))?;
        Ok(HealthCheckDefinition {
            http: self.http.clone(),
            header: self.header.clone(),
            method: self.method.clone(),
            body: self.body.clone(),
            tls_server_name: self.tls_server_name.clone(),
            tls_skip_verify: self.tls_skip_verify,
            tcp: self.tcp.clone(),
            grpc: self.grpc.clone(),
            grpc_use_tls: self.grpc_use_tls,
            interval: format_duration(interval),
            timeout: optional_duration(&self.timeout_duration, CrdError::InvalidTimeout)?,
            deregister_critical_service_after: optional_duration(
                &self.deregister_critical_service_after_duration,
                CrdError::InvalidDeregisterAfter,
            )?,
        })
    }
}

impl Registration {
    /// Name of the registered service.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.spec.service.name
    }

    /// Consul namespace of the registered service.
    #[must_use]
    pub fn service_namespace(&self) -> &str {
        &self.spec.service.namespace
    }

    /// Instance ID, falling back to the service name as Consul does.
    #[must_use]
    pub fn service_id(&self) -> &str {
        if self.spec.service.id.is_empty() {
            &self.spec.service.name
        } else {
            &self.spec.service.id
        }
    }

    /// Body for `PUT /v1/catalog/register`.
    pub fn to_catalog_registration(&self) -> Result<CatalogRegistration, CrdError> {
        let spec = &self.spec;
        let service = &spec.service;

        let check = spec
            .check
            .as_ref()
            .map(|c| -> Result<AgentCheck, CrdError> {
                Ok(AgentCheck {
                    node: spec.node.clone(),
                    check_id: c.check_id.clone(),
                    name: c.name.clone(),
                    status: c.status.clone(),
                    notes: c.notes.clone(),
                    output: c.output.clone(),
                    service_id: c.service_id.clone(),
                    service_name: service.name.clone(),
                    check_type: c.check_type.clone(),
                    exposed_port: c.exposed_port,
                    definition: c.definition.to_consul()?,
                    namespace: service.namespace.clone(),
                    partition: service.partition.clone(),
                })
            })
            .transpose()?;

        Ok(CatalogRegistration {
            id: spec.id.clone(),
            node: spec.node.clone(),
            address: spec.address.clone(),
            tagged_addresses: spec.tagged_addresses.clone(),
            node_meta: spec.node_meta.clone(),
            datacenter: spec.datacenter.clone(),
            service: Some(AgentService {
                id: service.id.clone(),
                service: service.name.clone(),
                tags: service.tags.clone(),
                meta: service.meta.clone(),
                port: service.port,
                address: service.address.clone(),
                socket_path: service.socket_path.clone(),
                tagged_addresses: service
                    .tagged_addresses
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            ServiceAddress {
                                address: v.address.clone(),
                                port: v.port,
                            },
                        )
                    })
                    .collect(),
                weights: service.weights.as_ref().map(|w| Weights {
                    passing: w.passing,
                    warning: w.warning,
                }),
                enable_tag_override: service.enable_tag_override,
                locality: locality(service.locality.as_ref()),
                namespace: service.namespace.clone(),
                partition: service.partition.clone(),
            }),
            check,
            skip_node_update: spec.skip_node_update,
            partition: spec.partition.clone(),
            locality: locality(spec.locality.as_ref()),
        })
    }

    /// Body for `PUT /v1/catalog/deregister`.
    #[must_use]
    pub fn to_catalog_deregistration(&self) -> CatalogDeregistration {
        CatalogDeregistration {
            node: self.spec.node.clone(),
            address: self.spec.address.clone(),
            datacenter: self.spec.datacenter.clone(),
            service_id: self.service_id().to_string(),
            check_id: self
                .spec
                .check
                .as_ref()
                .map(|c| c.check_id.clone())
                .unwrap_or_default(),
            namespace: self.spec.service.namespace.clone(),
            partition: self.spec.service.partition.clone(),
        }
    }

    /// Whether the specs are equal; status and metadata are ignored.
    #[must_use]
    pub fn equal_except_status(&self, other: &Registration) -> bool {
        self.spec == other.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{ConditionStatus, SyncStatus};
    use kube::api::ObjectMeta;

    fn registration() -> Registration {
        Registration {
            metadata: ObjectMeta {
                name: Some("test-registration".to_string()),
                ..Default::default()
            },
            spec: RegistrationSpec {
                node: "external".to_string(),
                address: "10.0.0.1".to_string(),
                datacenter: "dc1".to_string(),
                service: RegistrationService {
                    id: "service-name-1".to_string(),
                    name: "service-name".to_string(),
                    port: 8080,
                    namespace: "ns1".to_string(),
                    ..Default::default()
                },
                check: Some(RegistrationCheck {
                    check_id: "service-check".to_string(),
                    name: "service-check".to_string(),
                    status: "passing".to_string(),
                    definition: RegistrationCheckDefinition {
                        http: "http://10.0.0.1:8080/health".to_string(),
                        interval_duration: "10s".to_string(),
                        timeout_duration: "5000ms".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_to_catalog_registration() {
        let reg = registration().to_catalog_registration().unwrap();
        let service = reg.service.unwrap();
        assert_eq!(service.service, "service-name");
        assert_eq!(service.id, "service-name-1");
        assert_eq!(service.namespace, "ns1");

        let check = reg.check.unwrap();
        assert_eq!(check.definition.interval, "10s");
        assert_eq!(check.definition.timeout, "5s");
        assert_eq!(check.definition.deregister_critical_service_after, "");
        assert_eq!(check.service_name, "service-name");
    }

    #[test]
    fn test_duration_errors_name_the_field() {
        let mut bad_interval = registration();
        if let Some(check) = bad_interval.spec.check.as_mut() {
            check.definition.interval_duration = String::new();
        }
        assert!(matches!(
            bad_interval.to_catalog_registration(),
            Err(CrdError::InvalidInterval(_))
        ));

        let mut bad_timeout = registration();
        if let Some(check) = bad_timeout.spec.check.as_mut() {
            check.definition.timeout_duration = "soon".to_string();
        }
        assert!(matches!(
            bad_timeout.to_catalog_registration(),
            Err(CrdError::InvalidTimeout(v)) if v == "soon"
        ));

        let mut bad_dereg = registration();
        if let Some(check) = bad_dereg.spec.check.as_mut() {
            check.definition.deregister_critical_service_after_duration = "1d".to_string();
        }
        assert!(matches!(
            bad_dereg.to_catalog_registration(),
            Err(CrdError::InvalidDeregisterAfter(_))
        ));
    }

    #[test]
    fn test_to_catalog_deregistration() {
        let dereg = registration().to_catalog_deregistration();
        assert_eq!(dereg.node, "external");
        assert_eq!(dereg.service_id, "service-name-1");
        assert_eq!(dereg.check_id, "service-check");
        assert_eq!(dereg.namespace, "ns1");

        let mut unnamed = registration();
        unnamed.spec.service.id = String::new();
        assert_eq!(unnamed.to_catalog_deregistration().service_id, "service-name");
    }

    #[test]
    fn test_equal_except_status() {
        let a = registration();
        let mut b = registration();
        let mut status = SyncStatus::default();
        status.set_synced_condition(ConditionStatus::True, "", "");
        b.status = Some(status);
        b.metadata.resource_version = Some("42".to_string());
        assert!(a.equal_except_status(&b));

        b.spec.service.port = 9090;
        assert!(!a.equal_except_status(&b));
    }
}

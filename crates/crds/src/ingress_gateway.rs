//! IngressGateway CRD

use crate::conditions::SyncStatus;
use crate::config_entry::ConfigEntryResource;
use crate::shared::HttpHeaderModifiers;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "consul.hashicorp.com",
    version = "v1alpha1",
    kind = "IngressGateway",
    namespaced,
    status = "SyncStatus",
    shortname = "ingress-gateway",
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IngressGatewaySpec {
    /// Gateway-wide TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,

    /// Listeners and the services behind them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<IngressListener>,
}

/// TLS settings of an ingress gateway.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// Serve TLS on every listener
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,

    /// Certificates from an SDS cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sds: Option<GatewayTlsSdsConfig>,

    /// Minimum TLS version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_min_version: String,

    /// Maximum TLS version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_max_version: String,

    /// Allowed cipher suites
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,
}

/// SDS certificate source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsSdsConfig {
    /// SDS cluster
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,

    /// Certificate resource name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_resource: String,
}

/// A gateway listener.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngressListener {
    /// Port
    pub port: i32,

    /// `tcp`, `http`, `http2` or `grpc`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    /// Services reachable through the listener
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<IngressService>,

    /// Listener TLS override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,
}

/// A service exposed by a listener.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngressService {
    /// Service name, `*` for every HTTP service
    pub name: String,

    /// Host headers routed to the service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Partition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,

    /// Request header rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HttpHeaderModifiers>,

    /// Response header rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HttpHeaderModifiers>,
}

impl ConfigEntryResource for IngressGateway {
    const CONSUL_KIND: &'static str = "ingress-gateway";

    crate::config_entry_accessors!();
}

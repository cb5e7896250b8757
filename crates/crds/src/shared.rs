//! Spec fragments shared by several config-entry kinds

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema for free-form JSON objects Consul passes through untouched.
pub fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// How mesh gateways are used for upstream traffic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeshGateway {
    /// `none`, `local` or `remote`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
}

/// Transparent proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransparentProxy {
    /// Port the outbound listener binds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_listener_port: Option<i32>,

    /// Let downstreams dial instances directly
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dialed_directly: bool,
}

/// Paths exposed through the sidecar without mTLS.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Expose {
    /// Expose HTTP and gRPC health checks automatically
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub checks: bool,

    /// Explicit paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<ExposePath>,
}

/// One exposed path.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExposePath {
    /// Port the sidecar listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_port: Option<i32>,

    /// HTTP path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Port the local service listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path_port: Option<i32>,

    /// `http` or `http2`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

/// Header rewrites applied to requests or responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderModifiers {
    /// Headers appended
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,

    /// Headers overwritten
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,

    /// Headers removed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

/// Match on an HTTP header.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
    /// Header name
    pub name: String,

    /// Match when the header is present
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub present: bool,

    /// Exact value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exact: String,

    /// Value prefix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,

    /// Value suffix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,

    /// Value regex
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,

    /// Invert the match
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

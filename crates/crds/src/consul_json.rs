//! Conversion between Kubernetes spec JSON and Consul config-entry JSON
//!
//! Kubernetes specs are camelCase; Consul speaks PascalCase. The conversion
//! works on `serde_json` values so every kind shares it. Fields whose map keys
//! are user data keep those keys, and opaque proxy `config` is sent verbatim.

use crate::duration::canonical_duration;
use crate::error::CrdError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Fields whose object keys are user data (subset names, header names, meta).
const KEYED_FIELDS: &[&str] = &["subsets", "failover", "meta", "nodeMeta", "add", "set"];

/// Fields passed through without any key conversion.
const OPAQUE_FIELDS: &[&str] = &["config"];

/// Fields holding durations.
const DURATION_FIELDS: &[&str] = &[
    "connectTimeout",
    "requestTimeout",
    "idleTimeout",
    "interval",
    "baseEjectionTime",
    "ttl",
];

/// Keys Consul spells with an acronym.
const ACRONYMS: &[(&str, &str)] = &[
    ("id", "ID"),
    ("sni", "SNI"),
    ("tls", "TLS"),
    ("http", "HTTP"),
    ("jwt", "JWT"),
    ("caFile", "CAFile"),
    ("acl", "ACL"),
    ("ttl", "TTL"),
    ("tlsMinVersion", "TLSMinVersion"),
    ("tlsMaxVersion", "TLSMaxVersion"),
];

/// Header and bookkeeping fields never compared.
const ALWAYS_IGNORED: &[&str] = &[
    "kind",
    "name",
    "meta",
    "namespace",
    "partition",
    "createindex",
    "modifyindex",
    "hash",
];

fn pascal(key: &str) -> String {
    if let Some((_, acronym)) = ACRONYMS.iter().find(|(k, _)| *k == key) {
        return (*acronym).to_string();
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn convert(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(convert_object(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(convert).collect()),
        other => other,
    }
}

fn convert_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let value = if OPAQUE_FIELDS.contains(&key.as_str()) {
                value
            } else if KEYED_FIELDS.contains(&key.as_str()) {
                match value {
                    Value::Object(inner) => {
                        Value::Object(inner.into_iter().map(|(k, v)| (k, convert(v))).collect())
                    }
                    other => other,
                }
            } else if DURATION_FIELDS.contains(&key.as_str()) {
                match value {
                    Value::String(s) => Value::String(canonical_duration(&s)),
                    other => other,
                }
            } else {
                convert(value)
            };
            (pascal(&key), value)
        })
        .collect()
}

/// Serialize a Kubernetes spec into Consul's field naming.
pub fn to_consul_fields<T: Serialize>(spec: &T) -> Result<Map<String, Value>, CrdError> {
    match convert(serde_json::to_value(spec)?) {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(CrdError::InvalidSpec(format!(
            "spec must serialize to an object, got {other}"
        ))),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0s",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn normalize(value: &Value, ignored: &[&str], top: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, inner) in map {
                let lower = key.to_lowercase();
                if ignored.contains(&lower.as_str()) || (top && ALWAYS_IGNORED.contains(&lower.as_str())) {
                    continue;
                }
                if !top && (lower == "namespace" || lower == "partition") && inner.as_str() == Some("default") {
                    continue;
                }
                let inner = normalize(inner, ignored, false);
                if !is_zero(&inner) {
                    out.insert(lower, inner);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| normalize(v, ignored, false)).collect()),
        Value::Number(n) => n.as_f64().map_or_else(|| value.clone(), Value::from),
        other => other.clone(),
    }
}

/// Compare two config-entry bodies the way Consul would treat them.
///
/// Keys compare case-insensitively, empty values equal absent ones, nested
/// `default` namespaces and partitions equal empty ones, and the `ignored`
/// fields (lowercase) are skipped at every depth.
#[must_use]
pub fn bodies_match(kube: &Map<String, Value>, consul: &Map<String, Value>, ignored: &[&str]) -> bool {
    let kube = normalize(&Value::Object(kube.clone()), ignored, true);
    let consul = normalize(&Value::Object(consul.clone()), ignored, true);
    kube == consul
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_become_pascal_case() {
        let fields = to_consul_fields(&json!({
            "protocol": "http",
            "meshGateway": {"mode": "local"},
            "upstreamConfig": {"defaults": {"connectTimeoutMs": 5000}}
        }))
        .unwrap();
        assert_eq!(fields["Protocol"], "http");
        assert_eq!(fields["MeshGateway"]["Mode"], "local");
        assert_eq!(fields["UpstreamConfig"]["Defaults"]["ConnectTimeoutMs"], 5000);
    }

    #[test]
    fn test_user_keys_and_opaque_config_survive() {
        let fields = to_consul_fields(&json!({
            "subsets": {"v1": {"filter": "Service.Meta.version == v1", "onlyPassing": true}},
            "config": {"envoy_prometheus_bind_addr": "0.0.0.0:9102"},
            "meta": {"team": "payments"}
        }))
        .unwrap();
        assert_eq!(fields["Subsets"]["v1"]["Filter"], "Service.Meta.version == v1");
        assert_eq!(fields["Subsets"]["v1"]["OnlyPassing"], true);
        assert_eq!(fields["Config"]["envoy_prometheus_bind_addr"], "0.0.0.0:9102");
        assert_eq!(fields["Meta"]["team"], "payments");
    }

    #[test]
    fn test_durations_are_canonical() {
        let fields = to_consul_fields(&json!({"connectTimeout": "60m", "requestTimeout": "1500ms"})).unwrap();
        assert_eq!(fields["ConnectTimeout"], "1h0m0s");
        assert_eq!(fields["RequestTimeout"], "1.5s");
    }

    #[test]
    fn test_match_ignores_zero_values_and_default_scope() {
        let kube = to_consul_fields(&json!({
            "redirect": {"service": "api", "namespace": "default"}
        }))
        .unwrap();
        let consul = json!({
            "Redirect": {"Service": "api", "Namespace": "", "Partition": "default"},
            "ConnectTimeout": "0s",
            "CreateIndex": 12,
            "Meta": {"consul.hashicorp.com/source-datacenter": "dc1"}
        });
        let Value::Object(mut consul) = consul else { unreachable!() };
        assert!(bodies_match(&kube, &consul, &[]));

        consul.insert("ConnectTimeout".to_string(), json!("5s"));
        assert!(!bodies_match(&kube, &consul, &[]));
    }

    #[test]
    fn test_match_skips_ignored_nested_fields() {
        let kube = to_consul_fields(&json!({
            "sources": [{"name": "web", "action": "allow"}]
        }))
        .unwrap();
        let Value::Object(consul) = json!({
            "Sources": [{"Name": "web", "Action": "allow", "Precedence": 9, "Type": "consul"}]
        }) else {
            unreachable!()
        };
        assert!(!bodies_match(&kube, &consul, &[]));
        assert!(bodies_match(&kube, &consul, &["precedence", "type"]));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let Value::Object(a) = json!({"Weight": 50}) else { unreachable!() };
        let Value::Object(b) = json!({"Weight": 50.0}) else { unreachable!() };
        assert!(bodies_match(&a, &b, &[]));
    }
}

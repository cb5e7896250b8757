//! Builders shared by the CRD unit tests

use kube::api::ObjectMeta;

/// Metadata for a namespaced object.
pub fn object_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

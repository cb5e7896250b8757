//! Catalog operations for MockConsulClient
//!
//! Service listings honour blocking-query semantics: a call whose
//! `wait_index` is current waits until the catalog changes.

use super::{MockConsulClient, MockOperation, MockState};
use crate::common::{QueryMeta, QueryOptions, WriteOptions};
use crate::error::ConsulError;
use crate::models::{AgentService, CatalogDeregistration, CatalogRegistration, ServiceTags};
use std::collections::{BTreeMap, BTreeSet};

/// Node used for services added through the setup helpers.
const MOCK_NODE: &str = "mock-node";

fn bump(client: &MockConsulClient, state: &mut MockState) {
    state.catalog_index += 1;
    client.catalog_changed.notify_waiters();
}

fn scope(namespace: &str, fallback: &str) -> String {
    if namespace.is_empty() {
        fallback.to_string()
    } else {
        namespace.to_string()
    }
}

/// Parses the single filter shape the controllers send:
/// `ServiceMeta["key"] != "value"`.
fn meta_exclusion(filter: &str) -> Option<(String, String)> {
    let rest = filter.trim().strip_prefix("ServiceMeta[\"")?;
    let (key, rest) = rest.split_once("\"]")?;
    let value = rest.trim().strip_prefix("!=")?.trim();
    let value = value.strip_prefix('"')?.strip_suffix('"')?;
    Some((key.to_string(), value.to_string()))
}

pub(super) fn service_names(state: &MockState, namespace: &str) -> BTreeSet<String> {
    state
        .registrations
        .iter()
        .filter(|((ns, _, _), _)| ns == namespace)
        .filter_map(|(_, reg)| reg.service.as_ref().map(|s| s.service.clone()))
        .collect()
}

pub(super) fn insert_service(
    client: &MockConsulClient,
    namespace: &str,
    name: &str,
    meta: BTreeMap<String, String>,
) {
    let mut state = client.state();
    state.registrations.insert(
        (namespace.to_string(), MOCK_NODE.to_string(), name.to_string()),
        CatalogRegistration {
            node: MOCK_NODE.to_string(),
            address: "127.0.0.1".to_string(),
            service: Some(AgentService {
                id: name.to_string(),
                service: name.to_string(),
                meta,
                namespace: namespace.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    bump(client, &mut state);
}

pub(super) fn remove_service(client: &MockConsulClient, namespace: &str, name: &str) {
    let mut state = client.state();
    state.registrations.retain(|(ns, _, _), reg| {
        ns != namespace || reg.service.as_ref().is_none_or(|s| s.service != name)
    });
    bump(client, &mut state);
}

fn list(state: &MockState, opts: &QueryOptions) -> ServiceTags {
    let exclusion = meta_exclusion(&opts.filter);
    let mut services = ServiceTags::new();
    for ((ns, _, _), reg) in &state.registrations {
        if *ns != opts.namespace {
            continue;
        }
        let Some(service) = &reg.service else {
            continue;
        };
        if let Some((key, value)) = &exclusion {
            if service.meta.get(key) == Some(value) {
                continue;
            }
        }
        services
            .entry(service.service.clone())
            .or_default()
            .extend(service.tags.iter().cloned());
    }
    services
}

pub(super) async fn catalog_services(
    client: &MockConsulClient,
    opts: &QueryOptions,
) -> Result<(ServiceTags, QueryMeta), ConsulError> {
    client.enter(MockOperation::CatalogServices)?;
    loop {
        let changed = client.catalog_changed.notified();
        {
            let state = client.state();
            if opts.wait_index == 0 || state.catalog_index > opts.wait_index {
                return Ok((
                    list(&state, opts),
                    QueryMeta {
                        last_index: state.catalog_index,
                    },
                ));
            }
        }
        changed.await;
    }
}

pub(super) fn catalog_register(
    client: &MockConsulClient,
    registration: &CatalogRegistration,
    opts: &WriteOptions,
) -> Result<(), ConsulError> {
    client.enter(MockOperation::CatalogRegister)?;
    let Some(service) = &registration.service else {
        return Ok(());
    };
    let namespace = scope(&service.namespace, &opts.namespace);
    let service_id = scope(&service.id, &service.service);
    let mut state = client.state();
    state.registrations.insert(
        (namespace, registration.node.clone(), service_id),
        registration.clone(),
    );
    bump(client, &mut state);
    Ok(())
}

pub(super) fn catalog_deregister(
    client: &MockConsulClient,
    deregistration: &CatalogDeregistration,
    opts: &WriteOptions,
) -> Result<(), ConsulError> {
    client.enter(MockOperation::CatalogDeregister)?;
    let namespace = scope(&deregistration.namespace, &opts.namespace);
    let mut state = client.state();
    state.registrations.retain(|(ns, node, id), _| {
        !(*ns == namespace
            && *node == deregistration.node
            && (deregistration.service_id.is_empty() || *id == deregistration.service_id))
    });
    bump(client, &mut state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_exclusion_parses_controller_filter() {
        let parsed = meta_exclusion(r#"ServiceMeta["managed-by"] != "consul-k8s-endpoints-controller""#);
        assert_eq!(
            parsed,
            Some((
                "managed-by".to_string(),
                "consul-k8s-endpoints-controller".to_string()
            ))
        );
        assert_eq!(meta_exclusion(""), None);
    }
}

//! Config entry, namespace and virtual IP operations for MockConsulClient

use super::{MockConsulClient, MockOperation};
use crate::common::{QueryMeta, QueryOptions, WriteOptions};
use crate::error::ConsulError;
use crate::models::{ConfigEntry, Namespace};

pub(super) fn insert_entry(client: &MockConsulClient, namespace: &str, mut entry: ConfigEntry) {
    let mut state = client.state();
    state.raft_index += 1;
    if entry.create_index == 0 {
        entry.create_index = state.raft_index;
    }
    entry.modify_index = state.raft_index;
    state.config_entries.insert(
        (namespace.to_string(), entry.kind.clone(), entry.name.clone()),
        entry,
    );
}

pub(super) fn get_config_entry(
    client: &MockConsulClient,
    kind: &str,
    name: &str,
    opts: &QueryOptions,
) -> Result<(ConfigEntry, QueryMeta), ConsulError> {
    client.enter(MockOperation::GetConfigEntry)?;
    let state = client.state();
    state
        .config_entries
        .get(&(opts.namespace.clone(), kind.to_string(), name.to_string()))
        .cloned()
        .map(|entry| {
            (
                entry,
                QueryMeta {
                    last_index: state.raft_index,
                },
            )
        })
        .ok_or_else(|| {
            ConsulError::NotFound(format!("Config entry not found for {kind:?} / {name:?}"))
        })
}

pub(super) fn set_config_entry(
    client: &MockConsulClient,
    entry: &ConfigEntry,
    opts: &WriteOptions,
) -> Result<bool, ConsulError> {
    client.enter(MockOperation::SetConfigEntry)?;
    let key = (opts.namespace.clone(), entry.kind.clone(), entry.name.clone());
    let create_index = client
        .state()
        .config_entries
        .get(&key)
        .map(|existing| existing.create_index)
        .unwrap_or_default();
    insert_entry(
        client,
        &opts.namespace,
        ConfigEntry {
            create_index,
            ..entry.clone()
        },
    );
    Ok(true)
}

pub(super) fn delete_config_entry(
    client: &MockConsulClient,
    kind: &str,
    name: &str,
    opts: &WriteOptions,
) -> Result<(), ConsulError> {
    client.enter(MockOperation::DeleteConfigEntry)?;
    client
        .state()
        .config_entries
        .remove(&(opts.namespace.clone(), kind.to_string(), name.to_string()));
    Ok(())
}

pub(super) fn namespace_read(
    client: &MockConsulClient,
    name: &str,
) -> Result<Option<Namespace>, ConsulError> {
    client.enter(MockOperation::NamespaceRead)?;
    Ok(client.state().namespaces.get(name).cloned())
}

pub(super) fn namespace_create(
    client: &MockConsulClient,
    namespace: &Namespace,
) -> Result<Namespace, ConsulError> {
    client.enter(MockOperation::NamespaceCreate)?;
    client
        .state()
        .namespaces
        .insert(namespace.name.clone(), namespace.clone());
    Ok(namespace.clone())
}

pub(super) fn assign_service_virtual_ip(
    client: &MockConsulClient,
    service: &str,
    manual_vips: &[String],
    opts: &WriteOptions,
) -> Result<(), ConsulError> {
    client.enter(MockOperation::AssignVirtualIp)?;
    client.state().virtual_ips.insert(
        (opts.namespace.clone(), service.to_string()),
        manual_vips.to_vec(),
    );
    Ok(())
}

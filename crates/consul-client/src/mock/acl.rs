//! ACL operations for MockConsulClient

use super::{MockConsulClient, MockOperation};
use crate::error::ConsulError;
use crate::models::{AclPolicy, AclRole};
use uuid::Uuid;

pub(super) fn insert_role(client: &MockConsulClient, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    client.state().roles.insert(
        id.clone(),
        AclRole {
            id: id.clone(),
            name: name.to_string(),
            ..Default::default()
        },
    );
    id
}

pub(super) fn policy_read_by_name(
    client: &MockConsulClient,
    name: &str,
) -> Result<Option<AclPolicy>, ConsulError> {
    client.enter(MockOperation::PolicyReadByName)?;
    Ok(client
        .state()
        .policies
        .values()
        .find(|p| p.name == name)
        .cloned())
}

pub(super) fn policy_create(
    client: &MockConsulClient,
    policy: &AclPolicy,
) -> Result<AclPolicy, ConsulError> {
    client.enter(MockOperation::PolicyCreate)?;
    let mut state = client.state();
    if state.policies.values().any(|p| p.name == policy.name) {
        return Err(ConsulError::Api {
            status: 500,
            body: format!("Invalid Policy: A Policy with Name {:?} already exists", policy.name),
        });
    }
    let created = AclPolicy {
        id: Uuid::new_v4().to_string(),
        ..policy.clone()
    };
    state.policies.insert(created.id.clone(), created.clone());
    Ok(created)
}

pub(super) fn policy_delete(client: &MockConsulClient, id: &str) -> Result<(), ConsulError> {
    client.enter(MockOperation::PolicyDelete)?;
    client.state().policies.remove(id);
    Ok(())
}

pub(super) fn role_list(client: &MockConsulClient) -> Result<Vec<AclRole>, ConsulError> {
    client.enter(MockOperation::RoleList)?;
    Ok(client.state().roles.values().cloned().collect())
}

pub(super) fn role_read(client: &MockConsulClient, id: &str) -> Result<Option<AclRole>, ConsulError> {
    client.enter(MockOperation::RoleRead)?;
    Ok(client.state().roles.get(id).cloned())
}

pub(super) fn role_update(client: &MockConsulClient, role: &AclRole) -> Result<AclRole, ConsulError> {
    client.enter(MockOperation::RoleUpdate)?;
    let mut state = client.state();
    if !state.roles.contains_key(&role.id) {
        return Err(ConsulError::NotFound(format!("Cannot find role {}", role.id)));
    }
    state.roles.insert(role.id.clone(), role.clone());
    Ok(role.clone())
}

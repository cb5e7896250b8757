//! Terminating gateway ACL linkage.
//!
//! A terminating gateway can only proxy to a registered service if its token
//! may write that service. Each registered service gets a write policy, linked
//! to the role of every gateway that lists the service. Roles and policies
//! live in the default namespace.

use crate::error::ControllerError;
use crate::registration::{RegistrationSettings, is_default_namespace};
use consul_client::namespaces::DEFAULT_NAMESPACE;
use consul_client::{AclLink, AclPolicy, AclRole, ConsulClientTrait, QueryOptions, WriteOptions};
use crds::{Registration, TerminatingGateway};
use kube::ResourceExt;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

const POLICY_DESCRIPTION: &str = "Write policy for terminating gateways for external service";

/// Name of the write policy for `service` in `namespace`.
#[must_use]
pub fn policy_name(service: &str, namespace: &str) -> String {
    if is_default_namespace(namespace) {
        format!("{service}-write-policy")
    } else {
        format!("{namespace}-{service}-write-policy")
    }
}

fn default_if_empty(value: &str) -> &str {
    if value.is_empty() { DEFAULT_NAMESPACE } else { value }
}

/// HCL rules granting write on the registration's service.
#[must_use]
pub fn policy_rules(registration: &Registration, settings: &RegistrationSettings) -> String {
    let service = &registration.spec.service;
    let mut blocks = Vec::new();
    if settings.partitions_enabled {
        blocks.push(format!("partition \"{}\"", default_if_empty(&service.partition)));
    }
    if settings.namespaces_enabled {
        blocks.push(format!("namespace \"{}\"", default_if_empty(&service.namespace)));
    }
    blocks.push(format!("service \"{}\"", service.name));

    let mut rules = String::new();
    for (depth, block) in blocks.iter().enumerate() {
        let _ = writeln!(rules, "{}{block} {{", "  ".repeat(depth));
    }
    let _ = writeln!(rules, "{}policy = \"write\"", "  ".repeat(blocks.len()));
    for depth in (0..blocks.len()).rev() {
        let _ = writeln!(rules, "{}}}", "  ".repeat(depth));
    }
    rules
}

/// Gateway roles are named `{prefix}-{gateway}-acl-role`; the leading dash
/// keeps `gateway` from matching `terminating-gateway`'s role.
fn role_suffix(gateway: &TerminatingGateway) -> String {
    format!("-{}-acl-role", gateway.name_any())
}

fn find_role<'a>(roles: &'a [AclRole], gateway: &TerminatingGateway) -> Option<&'a AclRole> {
    let suffix = role_suffix(gateway);
    roles.iter().find(|r| r.name.ends_with(&suffix))
}

fn role_not_found(gateway: &TerminatingGateway) -> ControllerError {
    ControllerError::Reconciliation(format!(
        "terminating gateway role not found for {:?}",
        gateway.name_any()
    ))
}

/// Ensure the registration's write policy exists and is linked to the role
/// of every gateway in `gateways`. Failures are collected per gateway.
pub async fn link_gateways(
    consul: &dyn ConsulClientTrait,
    registration: &Registration,
    gateways: &[TerminatingGateway],
    settings: &RegistrationSettings,
) -> Result<(), ControllerError> {
    if gateways.is_empty() {
        debug!("No terminating gateway lists the service");
        return Ok(());
    }

    let name = policy_name(registration.service_name(), registration.service_namespace());
    let query = QueryOptions::default();
    let write = WriteOptions::default();

    let policy = match consul.acl_policy_read_by_name(&name, &query).await? {
        Some(policy) => policy,
        None => {
            let datacenters = if registration.spec.datacenter.is_empty() {
                Vec::new()
            } else {
                vec![registration.spec.datacenter.clone()]
            };
            let created = consul
                .acl_policy_create(
                    &AclPolicy {
                        name: name.clone(),
                        description: POLICY_DESCRIPTION.to_string(),
                        rules: policy_rules(registration, settings),
                        datacenters,
                        ..Default::default()
                    },
                    &write,
                )
                .await?;
            info!(policy = %name, "Created service write policy");
            created
        }
    };

    let roles = consul.acl_role_list(&query).await?;
    let mut errors = Vec::new();
    for gateway in gateways {
        let Some(listed) = find_role(&roles, gateway) else {
            warn!(gateway = %gateway.name_any(), "Terminating gateway role not found");
            errors.push(role_not_found(gateway));
            continue;
        };

        let mut role = match consul.acl_role_read(&listed.id, &query).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                errors.push(role_not_found(gateway));
                continue;
            }
            Err(e) => {
                errors.push(e.into());
                continue;
            }
        };

        if role.policies.iter().any(|link| link.name == policy.name) {
            debug!(role = %role.name, policy = %policy.name, "Policy already linked");
            continue;
        }

        role.policies.push(AclLink {
            id: policy.id.clone(),
            name: policy.name.clone(),
        });
        match consul.acl_role_update(&role, &write).await {
            Ok(_) => info!(role = %role.name, policy = %policy.name, "Linked policy to terminating gateway role"),
            Err(e) => {
                warn!(role = %role.name, error = %e, "Failed to update role");
                errors.push(ControllerError::Reconciliation(format!(
                    "error updating role {:?}: {e}",
                    role.name
                )));
            }
        }
    }

    ControllerError::join(errors).map_or(Ok(()), Err)
}

/// Remove the registration's write policy from every gateway role in
/// `gateways`, then delete the policy once no role links it.
pub async fn unlink_gateways(
    consul: &dyn ConsulClientTrait,
    registration: &Registration,
    gateways: &[TerminatingGateway],
) -> Result<(), ControllerError> {
    if gateways.is_empty() {
        debug!("No terminating gateway lists the service, no roles to update");
        return Ok(());
    }

    let name = policy_name(registration.service_name(), registration.service_namespace());
    let query = QueryOptions::default();
    let write = WriteOptions::default();

    let roles = consul.acl_role_list(&query).await?;
    let mut errors = Vec::new();
    for gateway in gateways {
        let Some(role) = find_role(&roles, gateway) else {
            warn!(gateway = %gateway.name_any(), "Terminating gateway role not found");
            errors.push(role_not_found(gateway));
            continue;
        };

        let mut role = role.clone();
        let before = role.policies.len();
        role.policies.retain(|link| link.name != name);
        if role.policies.len() == before {
            debug!(role = %role.name, policy = %name, "Policy not linked to role");
            continue;
        }

        match consul.acl_role_update(&role, &write).await {
            Ok(_) => info!(role = %role.name, policy = %name, "Unlinked policy from terminating gateway role"),
            Err(e) => {
                warn!(role = %role.name, error = %e, "Failed to update role");
                errors.push(ControllerError::Reconciliation(format!(
                    "error updating role {:?}: {e}",
                    role.name
                )));
            }
        }
    }

    if let Err(e) = delete_unused_policy(consul, &name).await {
        errors.push(e);
    }

    ControllerError::join(errors).map_or(Ok(()), Err)
}

/// Delete policy `name` unless some role still links it.
async fn delete_unused_policy(
    consul: &dyn ConsulClientTrait,
    name: &str,
) -> Result<(), ControllerError> {
    let query = QueryOptions::default();
    let still_linked = consul
        .acl_role_list(&query)
        .await?
        .iter()
        .any(|role| role.policies.iter().any(|link| link.name == name));
    if still_linked {
        debug!(policy = %name, "Policy still linked, keeping it");
        return Ok(());
    }

    let Some(policy) = consul.acl_policy_read_by_name(name, &query).await? else {
        return Ok(());
    };
    consul
        .acl_policy_delete(&policy.id, &WriteOptions::default())
        .await
        .map_err(|e| {
            ControllerError::Reconciliation(format!(
                "error deleting service ACL policy {:?}: {e}",
                policy.id
            ))
        })?;
    info!(policy = %name, "Deleted service write policy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use consul_client::{MockConsulClient, MockOperation};

    fn settings() -> RegistrationSettings {
        RegistrationSettings {
            acls_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_policy_name_includes_non_default_namespace() {
        assert_eq!(policy_name("db", ""), "db-write-policy");
        assert_eq!(policy_name("db", "default"), "db-write-policy");
        assert_eq!(policy_name("db", "billing"), "billing-db-write-policy");
    }

    #[test]
    fn test_policy_rules_without_scopes() {
        let reg = create_test_registration("db", "db", "");
        assert_eq!(
            policy_rules(&reg, &settings()),
            "service \"db\" {\n  policy = \"write\"\n}\n"
        );
    }

    #[test]
    fn test_policy_rules_nest_partition_and_namespace() {
        let reg = create_test_registration("db", "db", "");
        let scoped = RegistrationSettings {
            namespaces_enabled: true,
            partitions_enabled: true,
            ..settings()
        };
        let expected = "partition \"default\" {\n  namespace \"default\" {\n    service \"db\" {\n      policy = \"write\"\n    }\n  }\n}\n";
        assert_eq!(policy_rules(&reg, &scoped), expected);
    }

    #[tokio::test]
    async fn test_link_creates_policy_once_and_links_role() {
        let consul = MockConsulClient::default();
        let role_id = consul.add_role("consul-terminating-gateway-acl-role");
        let reg = create_test_registration("db", "db", "");
        let gateways = vec![create_test_terminating_gateway("terminating-gateway", &[("db", "")])];

        link_gateways(&consul, &reg, &gateways, &settings()).await.unwrap();
        link_gateways(&consul, &reg, &gateways, &settings()).await.unwrap();

        assert_eq!(consul.calls(MockOperation::PolicyCreate), 1);
        assert_eq!(consul.calls(MockOperation::RoleUpdate), 1);
        let role = consul.role(&role_id).unwrap();
        assert_eq!(role.policies.len(), 1);
        assert_eq!(role.policies[0].name, "db-write-policy");
        assert!(!role.policies[0].id.is_empty());
    }

    #[tokio::test]
    async fn test_link_collects_errors_per_gateway() {
        let consul = MockConsulClient::default();
        let role_id = consul.add_role("consul-tgw-a-acl-role");
        let reg = create_test_registration("db", "db", "");
        let gateways = vec![
            create_test_terminating_gateway("tgw-a", &[("db", "")]),
            create_test_terminating_gateway("tgw-b", &[("db", "")]),
        ];

        let err = link_gateways(&consul, &reg, &gateways, &settings())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("\"tgw-b\""));
        assert_eq!(consul.role(&role_id).unwrap().policies.len(), 1, "tgw-a still linked");
    }

    #[tokio::test]
    async fn test_unlink_deletes_policy_when_unused() {
        let consul = MockConsulClient::default();
        let role_id = consul.add_role("consul-terminating-gateway-acl-role");
        let reg = create_test_registration("db", "db", "");
        let gateways = vec![create_test_terminating_gateway("terminating-gateway", &[("db", "")])];
        link_gateways(&consul, &reg, &gateways, &settings()).await.unwrap();

        unlink_gateways(&consul, &reg, &gateways).await.unwrap();

        assert!(consul.role(&role_id).unwrap().policies.is_empty());
        assert!(consul.policy_by_name("db-write-policy").is_none());
    }

    #[tokio::test]
    async fn test_unlink_keeps_policy_linked_elsewhere() {
        let consul = MockConsulClient::default();
        consul.add_role("consul-tgw-a-acl-role");
        let other = consul.add_role("consul-tgw-b-acl-role");
        let reg = create_test_registration("db", "db", "");
        let both = vec![
            create_test_terminating_gateway("tgw-a", &[("db", "")]),
            create_test_terminating_gateway("tgw-b", &[("db", "")]),
        ];
        link_gateways(&consul, &reg, &both, &settings()).await.unwrap();

        unlink_gateways(&consul, &reg, &both[..1]).await.unwrap();

        assert_eq!(consul.role(&other).unwrap().policies.len(), 1);
        assert!(consul.policy_by_name("db-write-policy").is_some());
    }

    #[tokio::test]
    async fn test_roles_match_whole_gateway_name() {
        let consul = MockConsulClient::default();
        let longer = consul.add_role("consul-terminating-gateway-acl-role");
        let own = consul.add_role("consul-gateway-acl-role");
        let reg = create_test_registration("db", "db", "");
        let gateway = vec![create_test_terminating_gateway("gateway", &[("db", "")])];
        let terminating = vec![create_test_terminating_gateway("terminating-gateway", &[("db", "")])];

        link_gateways(&consul, &reg, &gateway, &settings()).await.unwrap();

        assert_eq!(consul.role(&own).unwrap().policies.len(), 1);
        assert!(consul.role(&longer).unwrap().policies.is_empty());

        link_gateways(&consul, &reg, &terminating, &settings()).await.unwrap();
        unlink_gateways(&consul, &reg, &gateway).await.unwrap();

        assert!(consul.role(&own).unwrap().policies.is_empty());
        assert_eq!(consul.role(&longer).unwrap().policies.len(), 1);
        assert!(consul.policy_by_name("db-write-policy").is_some());
    }

    #[tokio::test]
    async fn test_role_update_failure_is_reported() {
        let consul = MockConsulClient::default();
        consul.add_role("consul-terminating-gateway-acl-role");
        consul.fail_on(MockOperation::RoleUpdate);
        let reg = create_test_registration("db", "db", "");
        let gateways = vec![create_test_terminating_gateway("terminating-gateway", &[("db", "")])];

        let err = link_gateways(&consul, &reg, &gateways, &settings())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("error updating role"));
    }
}

//! Status conditions shared by every CRD in this crate.
//!
//! Conditions are always written as a complete list. A reconcile that does not
//! emit a condition type drops it, so callers never merge with the previous
//! status.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether the resource is in sync with Consul.
pub const CONDITION_SYNCED: &str = "Synced";

/// A Registration's service is in the catalog.
pub const CONDITION_REGISTERED: &str = "Registered";

/// A Registration's service has left the catalog.
pub const CONDITION_DEREGISTERED: &str = "Deregistered";

/// Terminating gateway ACL roles reflect a Registration.
pub const CONDITION_ACLS_UPDATED: &str = "ACLsUpdated";

/// Tri-state condition status, serialized as Kubernetes does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Not yet known, or the last attempt was ambiguous
    #[default]
    Unknown,
}

/// A single status condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `Synced`
    #[serde(rename = "type")]
    pub type_: String,

    /// Condition status
    pub status: ConditionStatus,

    /// When the condition was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Machine-readable reason for a non-True status
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable detail
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    /// A condition stamped with the current time.
    #[must_use]
    pub fn new(
        type_: &str,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            last_transition_time: Some(Utc::now()),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// A `True` condition with no reason.
    #[must_use]
    pub fn ok(type_: &str) -> Self {
        Self::new(type_, ConditionStatus::True, "", "")
    }

    /// Whether the status is `True`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Status block used by all config-entry kinds and by Registration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current conditions, replaced wholesale on every write
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last time the resource was successfully synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_time: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Condition of the given type, if present.
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Status of `Synced`, `Unknown` when absent.
    #[must_use]
    pub fn synced_condition_status(&self) -> ConditionStatus {
        self.condition(CONDITION_SYNCED)
            .map_or(ConditionStatus::Unknown, |c| c.status)
    }

    /// Replace all conditions with a single `Synced` condition.
    pub fn set_synced_condition(
        &mut self,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.conditions = vec![Condition::new(CONDITION_SYNCED, status, reason, message)];
    }

    /// Replace all conditions.
    pub fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }
}

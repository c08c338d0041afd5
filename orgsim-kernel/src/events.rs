/// Event definitions.
///
/// Events are pure data. They carry intent and payload only.
/// They contain ZERO transition logic.
///
/// Schema version is locked at 1. Events with schema_version != 1
/// are rejected by the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{DependencyKind, ScaleStage};
use crate::error::KernelError;

/// Schema version for v1 kernel events. Hardcoded, never changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Event envelope — the canonical wire object.
///
/// `sequence` may be absent on input; the orchestrator assigns it.
/// `timestamp` is an advisory RFC 3339 string, never hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Tagged payload variants — internal dispatch is on the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    InitializeConstants(InitializeConstantsPayload),
    AddRole(AddRolePayload),
    RemoveRole(RemoveRolePayload),
    AddDependency(AddDependencyPayload),
    InjectShock(InjectShockPayload),
    ApplyConstraintChange(ConstraintChangePayload),
    DifferentiateRole(DifferentiateRolePayload),
    CompressRoles(CompressRolesPayload),
}

impl EventPayload {
    /// Wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InitializeConstants(_) => "initialize_constants",
            Self::AddRole(_) => "add_role",
            Self::RemoveRole(_) => "remove_role",
            Self::AddDependency(_) => "add_dependency",
            Self::InjectShock(_) => "inject_shock",
            Self::ApplyConstraintChange(_) => "apply_constraint_change",
            Self::DifferentiateRole(_) => "differentiate_role",
            Self::CompressRoles(_) => "compress_roles",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitializeConstantsPayload {
    pub capital: i64,
    pub talent: i64,
    pub time: i64,
    pub political_cost: i64,
    pub differentiation_threshold: i64,
    pub compression_limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shock_base_multiplier: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shock_density_weight: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shock_deactivation_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differentiation_cost: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddRolePayload {
    pub id: String,
    pub name: String,
    pub purpose: String,
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub produced_outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_stage: Option<ScaleStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveRolePayload {
    pub role_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddDependencyPayload {
    pub from_role_id: String,
    pub to_role_id: String,
    pub dep_type: DependencyKind,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectShockPayload {
    pub target_role_id: String,
    pub magnitude: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintChangePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capital_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talent_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub political_cost_delta: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DifferentiateRolePayload {
    pub role_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressRolesPayload {
    pub source_role_id: String,
    pub target_role_id: String,
}

impl EventEnvelope {
    /// Parse an envelope from a JSON value. Shape failures are `BadSchema`.
    pub fn from_json(v: &Value) -> Result<Self, KernelError> {
        serde_json::from_value(v.clone()).map_err(|e| KernelError::BadSchema {
            field: "event".to_string(),
            detail: e.to_string(),
        })
    }

    /// Serialize to a JSON value for export.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("event envelopes always serialize")
    }
}

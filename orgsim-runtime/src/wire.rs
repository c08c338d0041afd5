//! Wire types and the kernel conversion bridge.
//!
//! Hand-written protobuf messages using prost derive macros, no
//! prost-build step. The binary event log stores these frames; the
//! kernel only ever sees its own typed envelopes.

use prost::Message;

use orgsim_kernel::domain::{DependencyKind, ScaleStage};
use orgsim_kernel::events::{
    AddDependencyPayload, AddRolePayload, CompressRolesPayload,
    ConstraintChangePayload, DifferentiateRolePayload, EventEnvelope, EventPayload,
    InitializeConstantsPayload, InjectShockPayload, RemoveRolePayload,
};

use crate::error::RuntimeError;

// ── Envelope ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct WireEventEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(uint32, tag = "2")]
    pub schema_version: u32,
    #[prost(string, tag = "3")]
    pub event_uuid: String,
    #[prost(string, tag = "4")]
    pub timestamp: String,
    #[prost(message, optional, tag = "5")]
    pub event: Option<WireEvent>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireEvent {
    #[prost(oneof = "WireEventKind", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub kind: Option<WireEventKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum WireEventKind {
    #[prost(message, tag = "1")]
    InitializeConstants(WireInitializeConstants),
    #[prost(message, tag = "2")]
    AddRole(WireAddRole),
    #[prost(message, tag = "3")]
    RemoveRole(WireRemoveRole),
    #[prost(message, tag = "4")]
    AddDependency(WireAddDependency),
    #[prost(message, tag = "5")]
    InjectShock(WireInjectShock),
    #[prost(message, tag = "6")]
    ApplyConstraintChange(WireApplyConstraintChange),
    #[prost(message, tag = "7")]
    DifferentiateRole(WireDifferentiateRole),
    #[prost(message, tag = "8")]
    CompressRoles(WireCompressRoles),
}

// ── Payloads ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct WireInitializeConstants {
    #[prost(int64, tag = "1")]
    pub capital: i64,
    #[prost(int64, tag = "2")]
    pub talent: i64,
    #[prost(int64, tag = "3")]
    pub time: i64,
    #[prost(int64, tag = "4")]
    pub political_cost: i64,
    #[prost(int64, tag = "5")]
    pub differentiation_threshold: i64,
    #[prost(int64, tag = "6")]
    pub compression_limit: i64,
    #[prost(int64, optional, tag = "7")]
    pub shock_base_multiplier: Option<i64>,
    #[prost(int64, optional, tag = "8")]
    pub shock_density_weight: Option<i64>,
    #[prost(int64, optional, tag = "9")]
    pub shock_deactivation_threshold: Option<i64>,
    #[prost(int64, optional, tag = "10")]
    pub differentiation_cost: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireAddRole {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub purpose: String,
    #[prost(string, repeated, tag = "4")]
    pub responsibilities: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub required_inputs: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub produced_outputs: Vec<String>,
    #[prost(string, optional, tag = "7")]
    pub scale_stage: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireRemoveRole {
    #[prost(string, tag = "1")]
    pub role_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireAddDependency {
    #[prost(string, tag = "1")]
    pub from_role_id: String,
    #[prost(string, tag = "2")]
    pub to_role_id: String,
    #[prost(string, tag = "3")]
    pub dep_type: String,
    #[prost(bool, tag = "4")]
    pub critical: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireInjectShock {
    #[prost(string, tag = "1")]
    pub target_role_id: String,
    #[prost(int64, tag = "2")]
    pub magnitude: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireApplyConstraintChange {
    #[prost(int64, optional, tag = "1")]
    pub capital_delta: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub talent_delta: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub time_delta: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub political_cost_delta: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireDifferentiateRole {
    #[prost(string, tag = "1")]
    pub role_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireCompressRoles {
    #[prost(string, tag = "1")]
    pub source_role_id: String,
    #[prost(string, tag = "2")]
    pub target_role_id: String,
}

// ── Kernel bridge ──────────────────────────────────────────────

/// Convert a kernel envelope into its wire frame.
///
/// The sequence must already be assigned; unsequenced events never
/// reach the log.
pub fn kernel_to_wire(event: &EventEnvelope) -> WireEventEnvelope {
    let kind = match &event.payload {
        EventPayload::InitializeConstants(p) => {
            WireEventKind::InitializeConstants(WireInitializeConstants {
                capital: p.capital,
                talent: p.talent,
                time: p.time,
                political_cost: p.political_cost,
                differentiation_threshold: p.differentiation_threshold,
                compression_limit: p.compression_limit,
                shock_base_multiplier: p.shock_base_multiplier,
                shock_density_weight: p.shock_density_weight,
                shock_deactivation_threshold: p.shock_deactivation_threshold,
                differentiation_cost: p.differentiation_cost,
            })
        }
        EventPayload::AddRole(p) => WireEventKind::AddRole(WireAddRole {
            id: p.id.clone(),
            name: p.name.clone(),
            purpose: p.purpose.clone(),
            responsibilities: p.responsibilities.clone(),
            required_inputs: p.required_inputs.clone(),
            produced_outputs: p.produced_outputs.clone(),
            scale_stage: p.scale_stage.map(|s| s.as_str().to_string()),
        }),
        EventPayload::RemoveRole(p) => WireEventKind::RemoveRole(WireRemoveRole {
            role_id: p.role_id.clone(),
        }),
        EventPayload::AddDependency(p) => {
            WireEventKind::AddDependency(WireAddDependency {
                from_role_id: p.from_role_id.clone(),
                to_role_id: p.to_role_id.clone(),
                dep_type: p.dep_type.as_str().to_string(),
                critical: p.critical,
            })
        }
        EventPayload::InjectShock(p) => WireEventKind::InjectShock(WireInjectShock {
            target_role_id: p.target_role_id.clone(),
            magnitude: p.magnitude,
        }),
        EventPayload::ApplyConstraintChange(p) => {
            WireEventKind::ApplyConstraintChange(WireApplyConstraintChange {
                capital_delta: p.capital_delta,
                talent_delta: p.talent_delta,
                time_delta: p.time_delta,
                political_cost_delta: p.political_cost_delta,
            })
        }
        EventPayload::DifferentiateRole(p) => {
            WireEventKind::DifferentiateRole(WireDifferentiateRole {
                role_id: p.role_id.clone(),
            })
        }
        EventPayload::CompressRoles(p) => {
            WireEventKind::CompressRoles(WireCompressRoles {
                source_role_id: p.source_role_id.clone(),
                target_role_id: p.target_role_id.clone(),
            })
        }
    };

    WireEventEnvelope {
        sequence: event.sequence.unwrap_or(0),
        schema_version: event.schema_version,
        event_uuid: event.event_uuid.clone().unwrap_or_default(),
        timestamp: event.timestamp.clone().unwrap_or_default(),
        event: Some(WireEvent { kind: Some(kind) }),
    }
}

/// Convert a wire frame back into the kernel envelope.
pub fn wire_to_kernel(wire: &WireEventEnvelope) -> Result<EventEnvelope, RuntimeError> {
    let kind = wire
        .event
        .as_ref()
        .and_then(|e| e.kind.as_ref())
        .ok_or_else(|| RuntimeError::CorruptLog {
            detail: format!("frame at sequence {} carries no event", wire.sequence),
        })?;

    let payload = match kind {
        WireEventKind::InitializeConstants(p) => {
            EventPayload::InitializeConstants(InitializeConstantsPayload {
                capital: p.capital,
                talent: p.talent,
                time: p.time,
                political_cost: p.political_cost,
                differentiation_threshold: p.differentiation_threshold,
                compression_limit: p.compression_limit,
                shock_base_multiplier: p.shock_base_multiplier,
                shock_density_weight: p.shock_density_weight,
                shock_deactivation_threshold: p.shock_deactivation_threshold,
                differentiation_cost: p.differentiation_cost,
            })
        }
        WireEventKind::AddRole(p) => EventPayload::AddRole(AddRolePayload {
            id: p.id.clone(),
            name: p.name.clone(),
            purpose: p.purpose.clone(),
            responsibilities: p.responsibilities.clone(),
            required_inputs: p.required_inputs.clone(),
            produced_outputs: p.produced_outputs.clone(),
            scale_stage: p
                .scale_stage
                .as_deref()
                .map(|s| parse_scale_stage(s, wire.sequence))
                .transpose()?,
        }),
        WireEventKind::RemoveRole(p) => EventPayload::RemoveRole(RemoveRolePayload {
            role_id: p.role_id.clone(),
        }),
        WireEventKind::AddDependency(p) => {
            EventPayload::AddDependency(AddDependencyPayload {
                from_role_id: p.from_role_id.clone(),
                to_role_id: p.to_role_id.clone(),
                dep_type: parse_dep_type(&p.dep_type, wire.sequence)?,
                critical: p.critical,
            })
        }
        WireEventKind::InjectShock(p) => EventPayload::InjectShock(InjectShockPayload {
            target_role_id: p.target_role_id.clone(),
            magnitude: p.magnitude,
        }),
        WireEventKind::ApplyConstraintChange(p) => {
            EventPayload::ApplyConstraintChange(ConstraintChangePayload {
                capital_delta: p.capital_delta,
                talent_delta: p.talent_delta,
                time_delta: p.time_delta,
                political_cost_delta: p.political_cost_delta,
            })
        }
        WireEventKind::DifferentiateRole(p) => {
            EventPayload::DifferentiateRole(DifferentiateRolePayload {
                role_id: p.role_id.clone(),
            })
        }
        WireEventKind::CompressRoles(p) => {
            EventPayload::CompressRoles(CompressRolesPayload {
                source_role_id: p.source_role_id.clone(),
                target_role_id: p.target_role_id.clone(),
            })
        }
    };

    Ok(EventEnvelope {
        schema_version: wire.schema_version,
        sequence: Some(wire.sequence),
        event_uuid: if wire.event_uuid.is_empty() {
            None
        } else {
            Some(wire.event_uuid.clone())
        },
        timestamp: if wire.timestamp.is_empty() {
            None
        } else {
            Some(wire.timestamp.clone())
        },
        payload,
    })
}

fn parse_dep_type(s: &str, sequence: u64) -> Result<DependencyKind, RuntimeError> {
    match s {
        "operational" => Ok(DependencyKind::Operational),
        "informational" => Ok(DependencyKind::Informational),
        "governance" => Ok(DependencyKind::Governance),
        other => Err(RuntimeError::CorruptLog {
            detail: format!("unknown dep_type {other:?} at sequence {sequence}"),
        }),
    }
}

fn parse_scale_stage(s: &str, sequence: u64) -> Result<ScaleStage, RuntimeError> {
    match s {
        "seed" => Ok(ScaleStage::Seed),
        "growth" => Ok(ScaleStage::Growth),
        "structured" => Ok(ScaleStage::Structured),
        "mature" => Ok(ScaleStage::Mature),
        other => Err(RuntimeError::CorruptLog {
            detail: format!("unknown scale_stage {other:?} at sequence {sequence}"),
        }),
    }
}

/// Encode a frame body for the length-prefixed log.
pub fn encode_frame(wire: &WireEventEnvelope) -> Vec<u8> {
    wire.encode_to_vec()
}

/// Decode a frame body read from the log.
pub fn decode_frame(bytes: &[u8]) -> Result<WireEventEnvelope, RuntimeError> {
    WireEventEnvelope::decode(bytes).map_err(|e| RuntimeError::CorruptLog {
        detail: format!("protobuf decode error: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_events() -> Vec<EventEnvelope> {
        [
            json!({
                "schema_version": 1,
                "sequence": 0,
                "event_type": "initialize_constants",
                "payload": {
                    "capital": 50000, "talent": 50000, "time": 50000,
                    "political_cost": 50000,
                    "differentiation_threshold": 3, "compression_limit": 5
                }
            }),
            json!({
                "schema_version": 1,
                "sequence": 1,
                "event_uuid": "3e2cdd80-33b7-4f2c-a0b5-9f3e6a68b2aa",
                "event_type": "add_role",
                "payload": {
                    "id": "eng", "name": "Eng", "purpose": "",
                    "responsibilities": ["build"], "scale_stage": "growth"
                }
            }),
            json!({
                "schema_version": 1,
                "sequence": 2,
                "event_type": "add_dependency",
                "payload": {
                    "from_role_id": "eng", "to_role_id": "ops",
                    "dep_type": "governance", "critical": true
                }
            }),
            json!({
                "schema_version": 1,
                "sequence": 3,
                "event_type": "apply_constraint_change",
                "payload": { "talent_delta": -100 }
            }),
        ]
        .iter()
        .map(|v| EventEnvelope::from_json(v).unwrap())
        .collect()
    }

    #[test]
    fn kernel_wire_round_trip_preserves_events() {
        for event in sample_events() {
            let wire = kernel_to_wire(&event);
            let frame = encode_frame(&wire);
            let decoded = decode_frame(&frame).unwrap();
            let back = wire_to_kernel(&decoded).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn empty_frame_is_corrupt() {
        let wire = WireEventEnvelope {
            sequence: 7,
            schema_version: 1,
            event_uuid: String::new(),
            timestamp: String::new(),
            event: None,
        };
        let err = wire_to_kernel(&wire).unwrap_err();
        assert_eq!(err.code(), "IOError");
    }

    #[test]
    fn unknown_dep_type_is_corrupt() {
        let wire = WireEventEnvelope {
            sequence: 2,
            schema_version: 1,
            event_uuid: String::new(),
            timestamp: String::new(),
            event: Some(WireEvent {
                kind: Some(WireEventKind::AddDependency(WireAddDependency {
                    from_role_id: "a".into(),
                    to_role_id: "b".into(),
                    dep_type: "social".into(),
                    critical: false,
                })),
            }),
        };
        assert!(wire_to_kernel(&wire).is_err());
    }
}

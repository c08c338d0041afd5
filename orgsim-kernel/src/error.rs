/// Kernel error surface.
///
/// Every rejection maps to exactly one machine-readable code plus the
/// offending field path. Transitions never unwind; all failures travel
/// through this type.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Event schema version or shape is not acceptable.
    #[error("bad schema at {field}: {detail}")]
    BadSchema { field: String, detail: String },

    /// Sequence number skipped ahead of the expected value.
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    /// Sequence number was already applied.
    #[error("sequence duplicate: {sequence} already applied")]
    SequenceDuplicate { sequence: u64 },

    /// Domain constants have not been initialized yet.
    #[error("constants unset: {detail}")]
    ConstantsUnset { detail: String },

    /// Role id is malformed, colliding, or otherwise unusable.
    #[error("bad role id {role_id:?}: {detail}")]
    BadRoleId { role_id: String, detail: String },

    /// Dependency references a missing role, itself, or an existing edge.
    #[error("dangling dependency {from} -> {to}: {detail}")]
    DanglingDependency {
        from: String,
        to: String,
        detail: String,
    },

    /// The critical-edge subgraph would contain a directed cycle.
    #[error("critical cycle: {path}")]
    CriticalCycle { path: String },

    /// A role ended up with zero responsibilities.
    #[error("role {role_id:?} has no responsibilities")]
    EmptyResponsibilities { role_id: String },

    /// An active role requires an input no active role produces.
    #[error("role {role_id:?} requires input {input:?} with no active producer")]
    OrphanedInput { role_id: String, input: String },

    /// A fixed-point value left its allowed range or an operation overflowed.
    #[error("fixed-point out of range at {field}: {detail}")]
    OutOfRangeFixedPoint { field: String, detail: String },

    /// The per-simulation compression budget is exhausted.
    #[error("compression limit {limit} reached")]
    CompressionLimit { limit: i64 },

    /// The referenced role does not exist.
    #[error("unknown role {role_id:?}")]
    UnknownRole { role_id: String },
}

impl KernelError {
    /// Machine-readable error code. Stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadSchema { .. } => "BadSchema",
            Self::SequenceGap { .. } => "SequenceGap",
            Self::SequenceDuplicate { .. } => "SequenceDuplicate",
            Self::ConstantsUnset { .. } => "ConstantsUnset",
            Self::BadRoleId { .. } => "BadRoleId",
            Self::DanglingDependency { .. } => "DanglingDependency",
            Self::CriticalCycle { .. } => "CriticalCycle",
            Self::EmptyResponsibilities { .. } => "EmptyResponsibilities",
            Self::OrphanedInput { .. } => "OrphanedInput",
            Self::OutOfRangeFixedPoint { .. } => "OutOfRangeFixedPoint",
            Self::CompressionLimit { .. } => "CompressionLimit",
            Self::UnknownRole { .. } => "UnknownRole",
        }
    }

    /// Path of the field that triggered the rejection, where one exists.
    pub fn field_path(&self) -> Option<String> {
        match self {
            Self::BadSchema { field, .. } => Some(field.clone()),
            Self::BadRoleId { role_id, .. } => Some(format!("roles.{role_id}")),
            Self::DanglingDependency { from, to, .. } => {
                Some(format!("dependencies.{from}->{to}"))
            }
            Self::EmptyResponsibilities { role_id } => {
                Some(format!("roles.{role_id}.responsibilities"))
            }
            Self::OrphanedInput { role_id, input } => {
                Some(format!("roles.{role_id}.required_inputs.{input}"))
            }
            Self::OutOfRangeFixedPoint { field, .. } => Some(field.clone()),
            Self::UnknownRole { role_id } => Some(format!("roles.{role_id}")),
            _ => None,
        }
    }

    /// Fatal errors leave the kernel untrustworthy; the session must be
    /// poisoned until the log re-verifies.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfRangeFixedPoint { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = KernelError::SequenceGap {
            expected: 3,
            got: 5,
        };
        assert_eq!(err.code(), "SequenceGap");
        assert!(err.field_path().is_none());

        let err = KernelError::OrphanedInput {
            role_id: "eng".into(),
            input: "designs".into(),
        };
        assert_eq!(err.code(), "OrphanedInput");
        assert_eq!(
            err.field_path().as_deref(),
            Some("roles.eng.required_inputs.designs")
        );
    }

    #[test]
    fn only_fixed_point_is_fatal() {
        assert!(KernelError::OutOfRangeFixedPoint {
            field: "constraint_vector.capital".into(),
            detail: "overflow".into(),
        }
        .is_fatal());
        assert!(!KernelError::UnknownRole {
            role_id: "x".into()
        }
        .is_fatal());
    }
}

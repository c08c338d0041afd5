/// Invariant checks.
///
/// Pure validation over a candidate state. The first violation aborts the
/// event application; the log is never touched on failure.

use std::collections::BTreeSet;

use crate::domain::{valid_role_id, OrgState};
use crate::error::KernelError;
use crate::fixedpoint::SATURATION_CAP;
use crate::graph::find_critical_cycle;

/// Run all invariant checks in a fixed order.
pub fn validate(state: &OrgState) -> Result<(), KernelError> {
    check_constants_set(state)?;
    check_role_ids(state)?;
    check_responsibilities(state)?;
    check_dependencies(state)?;
    check_orphaned_inputs(state)?;
    check_critical_cycles(state)?;
    check_fixed_point_ranges(state)?;
    Ok(())
}

/// Constants must exist before any structure does.
fn check_constants_set(state: &OrgState) -> Result<(), KernelError> {
    if state.constants.is_none()
        && (!state.roles.is_empty() || !state.dependencies.is_empty())
    {
        return Err(KernelError::ConstantsUnset {
            detail: "state carries structure without initialized constants".to_string(),
        });
    }
    Ok(())
}

/// Every role id is lowercase alphanumeric plus underscore.
fn check_role_ids(state: &OrgState) -> Result<(), KernelError> {
    for (key, role) in &state.roles {
        if key != &role.id {
            return Err(KernelError::BadRoleId {
                role_id: role.id.clone(),
                detail: format!("stored under mismatched key {key:?}"),
            });
        }
        if !valid_role_id(&role.id) {
            return Err(KernelError::BadRoleId {
                role_id: role.id.clone(),
                detail: "must match [a-z0-9_]+".to_string(),
            });
        }
    }
    Ok(())
}

/// Every role has at least one responsibility.
fn check_responsibilities(state: &OrgState) -> Result<(), KernelError> {
    for role in state.roles.values() {
        if role.responsibilities.is_empty() {
            return Err(KernelError::EmptyResponsibilities {
                role_id: role.id.clone(),
            });
        }
    }
    Ok(())
}

/// Dependencies reference existing roles, never themselves, never twice.
fn check_dependencies(state: &OrgState) -> Result<(), KernelError> {
    let mut seen: BTreeSet<(&str, &str, &str)> = BTreeSet::new();
    for dep in &state.dependencies {
        if !state.roles.contains_key(&dep.from_role_id) {
            return Err(KernelError::DanglingDependency {
                from: dep.from_role_id.clone(),
                to: dep.to_role_id.clone(),
                detail: "from_role_id does not exist".to_string(),
            });
        }
        if !state.roles.contains_key(&dep.to_role_id) {
            return Err(KernelError::DanglingDependency {
                from: dep.from_role_id.clone(),
                to: dep.to_role_id.clone(),
                detail: "to_role_id does not exist".to_string(),
            });
        }
        if dep.from_role_id == dep.to_role_id {
            return Err(KernelError::DanglingDependency {
                from: dep.from_role_id.clone(),
                to: dep.to_role_id.clone(),
                detail: "self-loop".to_string(),
            });
        }
        if !seen.insert((
            &dep.from_role_id,
            &dep.to_role_id,
            dep.dependency_type.as_str(),
        )) {
            return Err(KernelError::DanglingDependency {
                from: dep.from_role_id.clone(),
                to: dep.to_role_id.clone(),
                detail: format!("duplicate {} edge", dep.dependency_type.as_str()),
            });
        }
    }
    Ok(())
}

/// Every required input of an active, connected role has an active producer.
///
/// Isolated roles (zero degree) are exempt.
fn check_orphaned_inputs(state: &OrgState) -> Result<(), KernelError> {
    let mut produced: BTreeSet<&str> = BTreeSet::new();
    for role in state.roles.values().filter(|r| r.active) {
        for output in &role.produced_outputs {
            produced.insert(output.as_str());
        }
    }

    let mut connected: BTreeSet<&str> = BTreeSet::new();
    for dep in &state.dependencies {
        connected.insert(&dep.from_role_id);
        connected.insert(&dep.to_role_id);
    }

    for role in state.roles.values().filter(|r| r.active) {
        if !connected.contains(role.id.as_str()) {
            continue;
        }
        for input in &role.required_inputs {
            if !produced.contains(input.as_str()) {
                return Err(KernelError::OrphanedInput {
                    role_id: role.id.clone(),
                    input: input.clone(),
                });
            }
        }
    }
    Ok(())
}

/// The critical-edge subgraph is a DAG.
fn check_critical_cycles(state: &OrgState) -> Result<(), KernelError> {
    if let Some(cycle) = find_critical_cycle(&state.roles, &state.dependencies) {
        return Err(KernelError::CriticalCycle {
            path: cycle.join(" -> "),
        });
    }
    Ok(())
}

/// Constraint values stay in [0, SATURATION_CAP]; debt and counters stay >= 0.
fn check_fixed_point_ranges(state: &OrgState) -> Result<(), KernelError> {
    let cv = &state.constraint_vector;
    for (name, value) in [
        ("capital", cv.capital),
        ("talent", cv.talent),
        ("time", cv.time),
        ("political_cost", cv.political_cost),
    ] {
        if !(0..=SATURATION_CAP).contains(&value) {
            return Err(KernelError::OutOfRangeFixedPoint {
                field: format!("constraint_vector.{name}"),
                detail: format!("{value} outside [0, {SATURATION_CAP}]"),
            });
        }
    }
    if state.structural_debt < 0 {
        return Err(KernelError::OutOfRangeFixedPoint {
            field: "structural_debt".to_string(),
            detail: format!("{} is negative", state.structural_debt),
        });
    }
    if state.compression_count < 0 {
        return Err(KernelError::OutOfRangeFixedPoint {
            field: "compression_count".to_string(),
            detail: format!("{} is negative", state.compression_count),
        });
    }
    Ok(())
}

/// Centralized transition logic.
///
/// ALL state-mutation logic lives here. Transitions are pure and total on
/// valid input: `(state, payload) -> (state', result)` or a typed error.
/// All math is pure integer. No float. No implicit casting.

use std::collections::BTreeSet;

use crate::domain::{
    DependencyEdge, DomainConstants, OrgState, Role, TransitionResult,
    valid_role_id, DEFAULT_DIFFERENTIATION_COST, DEFAULT_SHOCK_BASE_MULTIPLIER,
    DEFAULT_SHOCK_DEACTIVATION_THRESHOLD, DEFAULT_SHOCK_DENSITY_WEIGHT,
};
use crate::error::KernelError;
use crate::events::{
    AddDependencyPayload, AddRolePayload, CompressRolesPayload,
    ConstraintChangePayload, DifferentiateRolePayload, EventEnvelope, EventPayload,
    InitializeConstantsPayload, InjectShockPayload, RemoveRolePayload,
};
use crate::fixedpoint::{checked_add, checked_mul, saturating_apply, SCALE};
use crate::graph::{active_fan_in, ego_density, find_critical_cycle};

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

/// Apply `event` to `state` and return `(new_state, result)`.
///
/// The original state is never mutated; handlers work on a clone and the
/// clone is discarded wholesale on error.
pub fn apply_event(
    state: &OrgState,
    event: &EventEnvelope,
) -> Result<(OrgState, TransitionResult), KernelError> {
    let mut next = state.clone();
    let result = match &event.payload {
        EventPayload::InitializeConstants(p) => apply_initialize_constants(&mut next, p),
        EventPayload::AddRole(p) => apply_add_role(&mut next, p),
        EventPayload::RemoveRole(p) => apply_remove_role(&mut next, p),
        EventPayload::AddDependency(p) => apply_add_dependency(&mut next, p),
        EventPayload::InjectShock(p) => apply_inject_shock(&mut next, p, state),
        EventPayload::ApplyConstraintChange(p) => apply_constraint_change(&mut next, p),
        EventPayload::DifferentiateRole(p) => apply_differentiate_role(&mut next, p, state),
        EventPayload::CompressRoles(p) => apply_compress_roles(&mut next, p),
    }?;
    Ok((next, result))
}

fn constants(state: &OrgState) -> Result<&DomainConstants, KernelError> {
    state.constants.as_ref().ok_or_else(|| KernelError::ConstantsUnset {
        detail: "transition requires initialized constants".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Individual transition handlers (private)
// ---------------------------------------------------------------------------

fn apply_initialize_constants(
    state: &mut OrgState,
    p: &InitializeConstantsPayload,
) -> Result<TransitionResult, KernelError> {
    if state.constants.is_some() {
        return Err(KernelError::BadSchema {
            field: "event_type".to_string(),
            detail: "initialize_constants can only be the first event".to_string(),
        });
    }

    state.constants = Some(DomainConstants {
        differentiation_threshold: p.differentiation_threshold,
        compression_limit: p.compression_limit,
        shock_base_multiplier: p
            .shock_base_multiplier
            .unwrap_or(DEFAULT_SHOCK_BASE_MULTIPLIER),
        shock_density_weight: p
            .shock_density_weight
            .unwrap_or(DEFAULT_SHOCK_DENSITY_WEIGHT),
        shock_deactivation_threshold: p
            .shock_deactivation_threshold
            .unwrap_or(DEFAULT_SHOCK_DEACTIVATION_THRESHOLD),
        differentiation_cost: p
            .differentiation_cost
            .unwrap_or(DEFAULT_DIFFERENTIATION_COST),
        capital: p.capital,
        talent: p.talent,
        time: p.time,
        political_cost: p.political_cost,
    });
    state.constraint_vector.capital = p.capital;
    state.constraint_vector.talent = p.talent;
    state.constraint_vector.time = p.time;
    state.constraint_vector.political_cost = p.political_cost;

    Ok(TransitionResult {
        event_type: "initialize_constants".to_string(),
        reason: "constants initialized".to_string(),
        ..Default::default()
    })
}

fn apply_add_role(
    state: &mut OrgState,
    p: &AddRolePayload,
) -> Result<TransitionResult, KernelError> {
    if !valid_role_id(&p.id) {
        return Err(KernelError::BadRoleId {
            role_id: p.id.clone(),
            detail: "must match [a-z0-9_]+".to_string(),
        });
    }
    if state.roles.contains_key(&p.id) {
        return Err(KernelError::BadRoleId {
            role_id: p.id.clone(),
            detail: "already_exists".to_string(),
        });
    }
    if p.name.is_empty() {
        return Err(KernelError::BadRoleId {
            role_id: p.id.clone(),
            detail: "name must be non-empty".to_string(),
        });
    }

    // An empty responsibility list is replaced before validation.
    let mut responsibilities = if p.responsibilities.is_empty() {
        vec![format!("{}_default", p.id)]
    } else {
        p.responsibilities.clone()
    };
    responsibilities.sort();
    let mut required_inputs = p.required_inputs.clone();
    required_inputs.sort();
    let mut produced_outputs = p.produced_outputs.clone();
    produced_outputs.sort();

    let role = Role {
        id: p.id.clone(),
        name: p.name.clone(),
        purpose: p.purpose.clone(),
        responsibilities,
        required_inputs,
        produced_outputs,
        scale_stage: p.scale_stage.unwrap_or_default(),
        active: true,
    };
    state.roles.insert(role.id.clone(), role);

    Ok(TransitionResult {
        event_type: "add_role".to_string(),
        reason: format!("role {} added", p.id),
        ..Default::default()
    })
}

fn apply_remove_role(
    state: &mut OrgState,
    p: &RemoveRolePayload,
) -> Result<TransitionResult, KernelError> {
    if state.roles.remove(&p.role_id).is_none() {
        return Err(KernelError::UnknownRole {
            role_id: p.role_id.clone(),
        });
    }
    // Cascade in the same transition: no dependency may survive its endpoint.
    state
        .dependencies
        .retain(|d| d.from_role_id != p.role_id && d.to_role_id != p.role_id);

    Ok(TransitionResult {
        event_type: "remove_role".to_string(),
        reason: format!("role {} removed with cascading dependencies", p.role_id),
        ..Default::default()
    })
}

fn apply_add_dependency(
    state: &mut OrgState,
    p: &AddDependencyPayload,
) -> Result<TransitionResult, KernelError> {
    let dangling = |detail: &str| KernelError::DanglingDependency {
        from: p.from_role_id.clone(),
        to: p.to_role_id.clone(),
        detail: detail.to_string(),
    };

    if !state.roles.contains_key(&p.from_role_id) {
        return Err(dangling("from_role_id does not exist"));
    }
    if !state.roles.contains_key(&p.to_role_id) {
        return Err(dangling("to_role_id does not exist"));
    }
    if p.from_role_id == p.to_role_id {
        return Err(dangling("self-loop"));
    }
    if state.dependencies.iter().any(|d| {
        d.from_role_id == p.from_role_id
            && d.to_role_id == p.to_role_id
            && d.dependency_type == p.dep_type
    }) {
        return Err(dangling("duplicate edge"));
    }

    let edge = DependencyEdge {
        from_role_id: p.from_role_id.clone(),
        to_role_id: p.to_role_id.clone(),
        dependency_type: p.dep_type,
        critical: p.critical,
    };

    if p.critical {
        // Probe the critical subgraph as if the edge were present.
        let mut candidate = state.dependencies.clone();
        candidate.push(edge.clone());
        if let Some(cycle) = find_critical_cycle(&state.roles, &candidate) {
            return Err(KernelError::CriticalCycle {
                path: cycle.join(" -> "),
            });
        }
    }

    state.dependencies.push(edge);

    Ok(TransitionResult {
        event_type: "add_dependency".to_string(),
        reason: format!(
            "{} -> {} ({}) added",
            p.from_role_id,
            p.to_role_id,
            p.dep_type.as_str()
        ),
        ..Default::default()
    })
}

fn apply_constraint_change(
    state: &mut OrgState,
    p: &ConstraintChangePayload,
) -> Result<TransitionResult, KernelError> {
    let cv = &mut state.constraint_vector;
    let mut saturated_fields = 0i64;

    for (slot, delta) in [
        (&mut cv.capital, p.capital_delta),
        (&mut cv.talent, p.talent_delta),
        (&mut cv.time, p.time_delta),
        (&mut cv.political_cost, p.political_cost_delta),
    ] {
        let (next, saturated) = saturating_apply(*slot, delta.unwrap_or(0));
        *slot = next;
        if saturated {
            saturated_fields += 1;
        }
    }

    // Each clamped field is absorbed stress: one unit of secondary debt.
    state.structural_debt =
        checked_add(state.structural_debt, saturated_fields, "structural_debt")?;

    Ok(TransitionResult {
        event_type: "apply_constraint_change".to_string(),
        secondary_debt: saturated_fields,
        reason: if saturated_fields > 0 {
            format!("{saturated_fields} constraint field(s) saturated")
        } else {
            "constraints adjusted".to_string()
        },
        ..Default::default()
    })
}

fn apply_inject_shock(
    state: &mut OrgState,
    p: &InjectShockPayload,
    original: &OrgState,
) -> Result<TransitionResult, KernelError> {
    if !(1..=10).contains(&p.magnitude) {
        return Err(KernelError::OutOfRangeFixedPoint {
            field: "payload.magnitude".to_string(),
            detail: format!("{} outside [1, 10]", p.magnitude),
        });
    }
    if !state.roles.contains_key(&p.target_role_id) {
        return Err(KernelError::UnknownRole {
            role_id: p.target_role_id.clone(),
        });
    }
    let c = constants(state)?.clone();

    // primary_debt = magnitude * (base_multiplier + density * weight / SCALE)
    let target_density = ego_density(&p.target_role_id, original);
    let density_scaled =
        checked_mul(target_density, c.shock_density_weight, "target_density")? / SCALE;
    let primary_debt = checked_mul(
        p.magnitude,
        checked_add(c.shock_base_multiplier, density_scaled, "primary_debt")?,
        "primary_debt",
    )?;

    let mut deactivated = false;
    if p.magnitude > c.shock_deactivation_threshold {
        state
            .roles
            .get_mut(&p.target_role_id)
            .expect("target existence checked above")
            .active = false;
        deactivated = true;
    }

    // Neighbours whose differentiation is due but refused by constraints
    // absorb the shock as secondary debt.
    let mut neighbours: BTreeSet<&str> = BTreeSet::new();
    for dep in &original.dependencies {
        if dep.from_role_id == p.target_role_id {
            neighbours.insert(&dep.to_role_id);
        } else if dep.to_role_id == p.target_role_id {
            neighbours.insert(&dep.from_role_id);
        }
    }

    let allowed = differentiation_affordable(state, &c);
    let mut secondary_debt: i64 = 0;
    for nbr in neighbours {
        let Some(role) = state.roles.get(nbr) else { continue };
        if !role.active {
            continue;
        }
        let fan_in = active_fan_in(nbr, original);
        if fan_in >= c.differentiation_threshold && !allowed {
            secondary_debt = checked_add(
                secondary_debt,
                fan_in - c.differentiation_threshold,
                "secondary_debt",
            )?;
        }
    }

    state.structural_debt = checked_add(
        state.structural_debt,
        checked_add(primary_debt, secondary_debt, "structural_debt")?,
        "structural_debt",
    )?;

    Ok(TransitionResult {
        event_type: "inject_shock".to_string(),
        primary_debt,
        secondary_debt,
        target_density,
        deactivated,
        reason: format!(
            "shock magnitude {} on {}",
            p.magnitude, p.target_role_id
        ),
        ..Default::default()
    })
}

fn differentiation_affordable(state: &OrgState, c: &DomainConstants) -> bool {
    state.constraint_vector.capital >= c.differentiation_cost
        && state.constraint_vector.talent >= c.differentiation_cost
}

fn apply_differentiate_role(
    state: &mut OrgState,
    p: &DifferentiateRolePayload,
    original: &OrgState,
) -> Result<TransitionResult, KernelError> {
    let role = state
        .roles
        .get(&p.role_id)
        .ok_or_else(|| KernelError::UnknownRole {
            role_id: p.role_id.clone(),
        })?
        .clone();
    let c = constants(state)?.clone();

    let fan_in = active_fan_in(&p.role_id, original);
    if fan_in < c.differentiation_threshold {
        return Ok(TransitionResult {
            event_type: "differentiate_role".to_string(),
            differentiation_skipped: true,
            reason: format!(
                "fan_in={fan_in} < differentiation_threshold={}",
                c.differentiation_threshold
            ),
            ..Default::default()
        });
    }

    if !differentiation_affordable(state, &c) {
        let secondary_debt = fan_in - c.differentiation_threshold;
        state.structural_debt =
            checked_add(state.structural_debt, secondary_debt, "structural_debt")?;
        return Ok(TransitionResult {
            event_type: "differentiate_role".to_string(),
            suppressed_differentiation: true,
            secondary_debt,
            reason: format!(
                "capital={} talent={} below differentiation_cost={}",
                state.constraint_vector.capital,
                state.constraint_vector.talent,
                c.differentiation_cost
            ),
            ..Default::default()
        });
    }

    // Fresh id: smallest free <id>_d<n> suffix.
    let mut n = 1u32;
    let new_id = loop {
        let candidate = format!("{}_d{}", p.role_id, n);
        if !state.roles.contains_key(&candidate) {
            break candidate;
        }
        n += 1;
    };

    // Lexicographic split: the lower half stays, the upper half moves.
    let mut sorted = role.responsibilities.clone();
    sorted.sort();
    let keep_len = (sorted.len() + 1) / 2;
    let moved: Vec<String> = sorted.split_off(keep_len);
    let moved = if moved.is_empty() {
        vec![format!("{new_id}_default")]
    } else {
        moved
    };

    let new_role = Role {
        id: new_id.clone(),
        name: format!("{} d{}", role.name, n),
        purpose: role.purpose.clone(),
        responsibilities: moved,
        required_inputs: role.required_inputs.clone(),
        produced_outputs: Vec::new(),
        scale_stage: role.scale_stage,
        active: true,
    };

    state
        .roles
        .get_mut(&p.role_id)
        .expect("role presence checked above")
        .responsibilities = sorted;
    state.roles.insert(new_id.clone(), new_role);

    // Re-point inbound dependencies round-robin in canonical order:
    // even positions stay on the original, odd positions move.
    let mut inbound: Vec<usize> = state
        .dependencies
        .iter()
        .enumerate()
        .filter(|(_, d)| d.to_role_id == p.role_id)
        .map(|(i, _)| i)
        .collect();
    inbound.sort_by(|&a, &b| {
        state.dependencies[a]
            .sort_key()
            .cmp(&state.dependencies[b].sort_key())
    });
    for (pos, &i) in inbound.iter().enumerate() {
        if pos % 2 == 1 {
            state.dependencies[i].to_role_id = new_id.clone();
        }
    }
    dedup_dependencies(&mut state.dependencies);

    state.constraint_vector.capital -= c.differentiation_cost;
    state.constraint_vector.talent -= c.differentiation_cost;

    Ok(TransitionResult {
        event_type: "differentiate_role".to_string(),
        differentiation_executed: true,
        reason: format!("{} split into {} and {new_id}", p.role_id, p.role_id),
        ..Default::default()
    })
}

fn apply_compress_roles(
    state: &mut OrgState,
    p: &CompressRolesPayload,
) -> Result<TransitionResult, KernelError> {
    let src = state
        .roles
        .get(&p.source_role_id)
        .ok_or_else(|| KernelError::UnknownRole {
            role_id: p.source_role_id.clone(),
        })?
        .clone();
    if !state.roles.contains_key(&p.target_role_id) {
        return Err(KernelError::UnknownRole {
            role_id: p.target_role_id.clone(),
        });
    }
    if p.source_role_id == p.target_role_id {
        return Err(KernelError::BadRoleId {
            role_id: p.source_role_id.clone(),
            detail: "source and target must differ".to_string(),
        });
    }
    let c = constants(state)?;
    if state.compression_count >= c.compression_limit {
        return Err(KernelError::CompressionLimit {
            limit: c.compression_limit,
        });
    }

    let union = |a: &[String], b: &[String]| -> Vec<String> {
        let set: BTreeSet<&String> = a.iter().chain(b.iter()).collect();
        set.into_iter().cloned().collect()
    };

    {
        let target = state
            .roles
            .get_mut(&p.target_role_id)
            .expect("target existence checked above");
        target.responsibilities = union(&target.responsibilities, &src.responsibilities);
        target.required_inputs = union(&target.required_inputs, &src.required_inputs);
        target.produced_outputs = union(&target.produced_outputs, &src.produced_outputs);
    }

    state
        .roles
        .get_mut(&p.source_role_id)
        .expect("source existence checked above")
        .active = false;

    // Rewrite every edge touching the source, drop self-loops, collapse
    // duplicates.
    for dep in &mut state.dependencies {
        if dep.from_role_id == p.source_role_id {
            dep.from_role_id = p.target_role_id.clone();
        }
        if dep.to_role_id == p.source_role_id {
            dep.to_role_id = p.target_role_id.clone();
        }
    }
    state.dependencies.retain(|d| d.from_role_id != d.to_role_id);
    dedup_dependencies(&mut state.dependencies);

    state.compression_count += 1;

    Ok(TransitionResult {
        event_type: "compress_roles".to_string(),
        compression_executed: true,
        deactivated: true,
        reason: format!("{} merged into {}", p.source_role_id, p.target_role_id),
        ..Default::default()
    })
}

/// Drop later duplicates of (from, to, type), keeping first occurrences.
fn dedup_dependencies(deps: &mut Vec<DependencyEdge>) {
    let mut seen: BTreeSet<(String, String, &'static str)> = BTreeSet::new();
    deps.retain(|d| {
        seen.insert((
            d.from_role_id.clone(),
            d.to_role_id.clone(),
            d.dependency_type.as_str(),
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencyKind;
    use crate::events::EventPayload;

    fn envelope(payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            schema_version: 1,
            sequence: None,
            event_uuid: None,
            timestamp: None,
            payload,
        }
    }

    fn init_payload() -> InitializeConstantsPayload {
        InitializeConstantsPayload {
            capital: 50000,
            talent: 50000,
            time: 50000,
            political_cost: 50000,
            differentiation_threshold: 3,
            compression_limit: 2,
            shock_base_multiplier: Some(2),
            shock_density_weight: None,
            shock_deactivation_threshold: None,
            differentiation_cost: None,
        }
    }

    fn seeded_state() -> OrgState {
        let (state, _) = apply_event(
            &OrgState::default(),
            &envelope(EventPayload::InitializeConstants(init_payload())),
        )
        .unwrap();
        state
    }

    fn with_role(state: &OrgState, id: &str) -> OrgState {
        let (next, _) = apply_event(
            state,
            &envelope(EventPayload::AddRole(AddRolePayload {
                id: id.to_string(),
                name: id.to_uppercase(),
                purpose: String::new(),
                responsibilities: Vec::new(),
                required_inputs: Vec::new(),
                produced_outputs: Vec::new(),
                scale_stage: None,
            })),
        )
        .unwrap();
        next
    }

    fn with_dep(state: &OrgState, from: &str, to: &str) -> OrgState {
        let (next, _) = apply_event(
            state,
            &envelope(EventPayload::AddDependency(AddDependencyPayload {
                from_role_id: from.to_string(),
                to_role_id: to.to_string(),
                dep_type: DependencyKind::Operational,
                critical: false,
            })),
        )
        .unwrap();
        next
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let state = seeded_state();
        let err = apply_event(
            &state,
            &envelope(EventPayload::InitializeConstants(init_payload())),
        )
        .unwrap_err();
        assert_eq!(err.code(), "BadSchema");
    }

    #[test]
    fn empty_responsibilities_get_default_entry() {
        let state = with_role(&seeded_state(), "eng");
        assert_eq!(
            state.roles["eng"].responsibilities,
            vec!["eng_default".to_string()]
        );
    }

    #[test]
    fn readding_role_is_rejected() {
        let state = with_role(&seeded_state(), "eng");
        let err = apply_event(
            &state,
            &envelope(EventPayload::AddRole(AddRolePayload {
                id: "eng".into(),
                name: "Eng".into(),
                purpose: String::new(),
                responsibilities: Vec::new(),
                required_inputs: Vec::new(),
                produced_outputs: Vec::new(),
                scale_stage: None,
            })),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KernelError::BadRoleId { ref detail, .. } if detail == "already_exists"
        ));
    }

    #[test]
    fn remove_role_cascades_dependencies() {
        let mut state = seeded_state();
        for id in ["a", "b", "c"] {
            state = with_role(&state, id);
        }
        state = with_dep(&state, "a", "b");
        state = with_dep(&state, "b", "c");

        let (next, _) = apply_event(
            &state,
            &envelope(EventPayload::RemoveRole(RemoveRolePayload {
                role_id: "b".into(),
            })),
        )
        .unwrap();
        assert!(!next.roles.contains_key("b"));
        assert!(next.dependencies.is_empty());
    }

    #[test]
    fn duplicate_dependency_is_rejected() {
        let mut state = seeded_state();
        state = with_role(&state, "a");
        state = with_role(&state, "b");
        state = with_dep(&state, "a", "b");
        let err = apply_event(
            &state,
            &envelope(EventPayload::AddDependency(AddDependencyPayload {
                from_role_id: "a".into(),
                to_role_id: "b".into(),
                dep_type: DependencyKind::Operational,
                critical: false,
            })),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DanglingDependency");
    }

    #[test]
    fn critical_cycle_is_rejected_before_commit() {
        let mut state = seeded_state();
        for id in ["a", "b"] {
            state = with_role(&state, id);
        }
        let critical = |from: &str, to: &str| {
            envelope(EventPayload::AddDependency(AddDependencyPayload {
                from_role_id: from.to_string(),
                to_role_id: to.to_string(),
                dep_type: DependencyKind::Governance,
                critical: true,
            }))
        };
        let (state, _) = apply_event(&state, &critical("a", "b")).unwrap();
        let err = apply_event(&state, &critical("b", "a")).unwrap_err();
        assert_eq!(err.code(), "CriticalCycle");
        assert_eq!(state.dependencies.len(), 1);
    }

    #[test]
    fn constraint_saturation_accrues_secondary_debt() {
        let state = seeded_state();
        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::ApplyConstraintChange(ConstraintChangePayload {
                capital_delta: Some(-80000),
                talent_delta: Some(10),
                time_delta: None,
                political_cost_delta: None,
            })),
        )
        .unwrap();
        assert_eq!(next.constraint_vector.capital, 0);
        assert_eq!(next.constraint_vector.talent, 50010);
        assert_eq!(result.secondary_debt, 1);
        assert_eq!(next.structural_debt, state.structural_debt + 1);
    }

    #[test]
    fn shock_magnitude_is_range_checked() {
        let state = with_role(&seeded_state(), "a");
        let err = apply_event(
            &state,
            &envelope(EventPayload::InjectShock(InjectShockPayload {
                target_role_id: "a".into(),
                magnitude: 11,
            })),
        )
        .unwrap_err();
        assert_eq!(err.code(), "OutOfRangeFixedPoint");
    }

    #[test]
    fn shock_debt_follows_the_density_formula() {
        let mut state = seeded_state();
        for id in ["a", "b", "t"] {
            state = with_role(&state, id);
        }
        state = with_dep(&state, "t", "a");
        state = with_dep(&state, "t", "b");

        // Ego of t = {a, b, t}: 2 internal edges over 6 potential = 3333.
        // density_scaled = 3333 * 5000 / 10000 = 1666.
        // primary = 4 * (2 + 1666) = 6672.
        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::InjectShock(InjectShockPayload {
                target_role_id: "t".into(),
                magnitude: 4,
            })),
        )
        .unwrap();
        assert_eq!(result.target_density, 3333);
        assert_eq!(result.primary_debt, 6672);
        assert_eq!(next.structural_debt, state.structural_debt + 6672);
        assert!(!result.deactivated);
    }

    #[test]
    fn large_shock_deactivates_target() {
        let state = with_role(&seeded_state(), "a");
        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::InjectShock(InjectShockPayload {
                target_role_id: "a".into(),
                magnitude: 9,
            })),
        )
        .unwrap();
        assert!(result.deactivated);
        assert!(!next.roles["a"].active);
    }

    fn fan_in_three(state: &OrgState) -> OrgState {
        let mut s = state.clone();
        for id in ["hub", "s1", "s2", "s3"] {
            s = with_role(&s, id);
        }
        for src in ["s1", "s2", "s3"] {
            s = with_dep(&s, src, "hub");
        }
        s
    }

    #[test]
    fn differentiation_below_threshold_is_skipped() {
        let mut state = seeded_state();
        state = with_role(&state, "hub");
        state = with_role(&state, "s1");
        state = with_dep(&state, "s1", "hub");
        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::DifferentiateRole(DifferentiateRolePayload {
                role_id: "hub".into(),
            })),
        )
        .unwrap();
        assert!(result.differentiation_skipped);
        assert_eq!(next.roles.len(), 2);
    }

    #[test]
    fn differentiation_splits_responsibilities_and_repoints_edges() {
        let mut state = fan_in_three(&seeded_state());
        state.roles.get_mut("hub").unwrap().responsibilities = vec![
            "alpha".into(),
            "beta".into(),
            "gamma".into(),
            "delta".into(),
        ];

        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::DifferentiateRole(DifferentiateRolePayload {
                role_id: "hub".into(),
            })),
        )
        .unwrap();
        assert!(result.differentiation_executed);

        let hub = &next.roles["hub"];
        let split = &next.roles["hub_d1"];
        assert_eq!(hub.responsibilities, vec!["alpha", "beta"]);
        assert_eq!(split.responsibilities, vec!["delta", "gamma"]);

        // Canonical inbound order s1, s2, s3: s2 moves to the new role.
        let targets: Vec<(&str, &str)> = next
            .dependencies
            .iter()
            .map(|d| (d.from_role_id.as_str(), d.to_role_id.as_str()))
            .collect();
        assert!(targets.contains(&("s1", "hub")));
        assert!(targets.contains(&("s2", "hub_d1")));
        assert!(targets.contains(&("s3", "hub")));

        // Cost charged to capital and talent.
        assert_eq!(next.constraint_vector.capital, 40000);
        assert_eq!(next.constraint_vector.talent, 40000);
    }

    #[test]
    fn suppressed_differentiation_accrues_fan_in_excess() {
        let mut state = fan_in_three(&seeded_state());
        state.constraint_vector.capital = 5000; // below differentiation_cost

        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::DifferentiateRole(DifferentiateRolePayload {
                role_id: "hub".into(),
            })),
        )
        .unwrap();
        assert!(result.suppressed_differentiation);
        assert!(!next.roles.contains_key("hub_d1"));
        // fan_in 3, threshold 3: excess 0.
        assert_eq!(result.secondary_debt, 0);

        let mut state = state.clone();
        state = with_role(&state, "s4");
        state = with_dep(&state, "s4", "hub");
        let (next, result) = apply_event(
            &state,
            &envelope(EventPayload::DifferentiateRole(DifferentiateRolePayload {
                role_id: "hub".into(),
            })),
        )
        .unwrap();
        assert!(result.suppressed_differentiation);
        assert_eq!(result.secondary_debt, 1);
        assert_eq!(next.structural_debt, state.structural_debt + 1);
    }

    #[test]
    fn compression_merges_and_respects_limit() {
        let mut state = seeded_state();
        for id in ["a", "b", "c", "d"] {
            state = with_role(&state, id);
        }
        state = with_dep(&state, "c", "a");
        state = with_dep(&state, "c", "b");

        let compress = |src: &str, tgt: &str| {
            envelope(EventPayload::CompressRoles(CompressRolesPayload {
                source_role_id: src.to_string(),
                target_role_id: tgt.to_string(),
            }))
        };

        let (state, result) = apply_event(&state, &compress("a", "b")).unwrap();
        assert!(result.compression_executed);
        assert!(!state.roles["a"].active);
        assert_eq!(
            state.roles["b"].responsibilities,
            vec!["a_default".to_string(), "b_default".to_string()]
        );
        // c->a rewrote to c->b and collapsed with the existing c->b edge.
        assert_eq!(state.dependencies.len(), 1);
        assert_eq!(state.compression_count, 1);

        let (state, _) = apply_event(&state, &compress("c", "d")).unwrap();
        let err = apply_event(&state, &compress("d", "b")).unwrap_err();
        assert_eq!(err.code(), "CompressionLimit");
    }
}

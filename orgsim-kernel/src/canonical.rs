/// Canonical serialization and hashing.
///
/// Deterministic canonical serialization + SHA-256 hashing.
/// Produces byte-identical output across platforms.
///
/// Rules:
///   - Objects emit keys in lexicographic byte order
///   - Roles sorted by id; responsibilities, inputs, outputs sorted
///   - Dependencies sorted by (from_role_id, to_role_id, dependency_type)
///   - Integers base-10, no whitespace, no float, no trailing newline
///   - Field set is whitelisted; digest is lowercase hex

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::OrgState;
use crate::error::KernelError;
use crate::KERNEL_VERSION;

/// Canonical serialization of OrgState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &OrgState) -> Result<Vec<u8>, KernelError> {
    let obj = build_canonical_value(state);
    reject_non_integers(&obj, "state")?;
    let text = serde_json::to_string(&obj).map_err(|e| KernelError::BadSchema {
        field: "state".to_string(),
        detail: e.to_string(),
    })?;
    Ok(text.into_bytes())
}

/// SHA-256 of the canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &OrgState) -> Result<String, KernelError> {
    let bytes = canonical_serialize(state)?;
    Ok(hex_digest(&bytes))
}

/// Lowercase-hex SHA-256 of arbitrary bytes.
pub fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Build the canonical serde_json::Value.
///
/// serde_json's default Map is a BTreeMap, so every object below is
/// emitted with keys in lexicographic byte order.
///
/// Whitelisted top-level fields: compression_count, constants,
/// constraint_vector, dependencies, event_count, kernel_version,
/// prev_state_hash, roles, structural_debt.
fn build_canonical_value(state: &OrgState) -> Value {
    // -- roles (sorted by id; BTreeMap is already sorted) --
    let mut roles_list: Vec<Value> = Vec::new();
    for role in state.roles.values() {
        let mut m = Map::new();
        m.insert("id".to_string(), Value::String(role.id.clone()));
        m.insert("name".to_string(), Value::String(role.name.clone()));
        m.insert("purpose".to_string(), Value::String(role.purpose.clone()));

        let mut resps = role.responsibilities.clone();
        resps.sort();
        m.insert(
            "responsibilities".to_string(),
            Value::Array(resps.into_iter().map(Value::String).collect()),
        );

        let mut inputs = role.required_inputs.clone();
        inputs.sort();
        m.insert(
            "required_inputs".to_string(),
            Value::Array(inputs.into_iter().map(Value::String).collect()),
        );

        let mut outputs = role.produced_outputs.clone();
        outputs.sort();
        m.insert(
            "produced_outputs".to_string(),
            Value::Array(outputs.into_iter().map(Value::String).collect()),
        );

        m.insert(
            "scale_stage".to_string(),
            Value::String(role.scale_stage.as_str().to_string()),
        );
        m.insert("active".to_string(), Value::Bool(role.active));
        roles_list.push(Value::Object(m));
    }

    // -- dependencies (sorted by from, to, type name) --
    let mut sorted_deps = state.dependencies.clone();
    sorted_deps.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut deps_list: Vec<Value> = Vec::new();
    for d in &sorted_deps {
        let mut m = Map::new();
        m.insert(
            "from_role_id".to_string(),
            Value::String(d.from_role_id.clone()),
        );
        m.insert("to_role_id".to_string(), Value::String(d.to_role_id.clone()));
        m.insert(
            "dependency_type".to_string(),
            Value::String(d.dependency_type.as_str().to_string()),
        );
        m.insert("critical".to_string(), Value::Bool(d.critical));
        deps_list.push(Value::Object(m));
    }

    // -- constraint_vector --
    let cv = &state.constraint_vector;
    let mut cv_map = Map::new();
    cv_map.insert("capital".to_string(), Value::Number(cv.capital.into()));
    cv_map.insert("talent".to_string(), Value::Number(cv.talent.into()));
    cv_map.insert("time".to_string(), Value::Number(cv.time.into()));
    cv_map.insert(
        "political_cost".to_string(),
        Value::Number(cv.political_cost.into()),
    );

    // -- constants (null until initialized) --
    let constants_value = match &state.constants {
        None => Value::Null,
        Some(c) => {
            let mut m = Map::new();
            m.insert(
                "differentiation_threshold".to_string(),
                Value::Number(c.differentiation_threshold.into()),
            );
            m.insert(
                "compression_limit".to_string(),
                Value::Number(c.compression_limit.into()),
            );
            m.insert(
                "shock_base_multiplier".to_string(),
                Value::Number(c.shock_base_multiplier.into()),
            );
            m.insert(
                "shock_density_weight".to_string(),
                Value::Number(c.shock_density_weight.into()),
            );
            m.insert(
                "shock_deactivation_threshold".to_string(),
                Value::Number(c.shock_deactivation_threshold.into()),
            );
            m.insert(
                "differentiation_cost".to_string(),
                Value::Number(c.differentiation_cost.into()),
            );
            m.insert("capital".to_string(), Value::Number(c.capital.into()));
            m.insert("talent".to_string(), Value::Number(c.talent.into()));
            m.insert("time".to_string(), Value::Number(c.time.into()));
            m.insert(
                "political_cost".to_string(),
                Value::Number(c.political_cost.into()),
            );
            Value::Object(m)
        }
    };

    let mut root = Map::new();
    root.insert(
        "kernel_version".to_string(),
        Value::Number((KERNEL_VERSION as i64).into()),
    );
    root.insert("constants".to_string(), constants_value);
    root.insert("roles".to_string(), Value::Array(roles_list));
    root.insert("dependencies".to_string(), Value::Array(deps_list));
    root.insert("constraint_vector".to_string(), Value::Object(cv_map));
    root.insert(
        "structural_debt".to_string(),
        Value::Number(state.structural_debt.into()),
    );
    root.insert(
        "compression_count".to_string(),
        Value::Number(state.compression_count.into()),
    );
    root.insert(
        "event_count".to_string(),
        Value::Number(state.event_count.into()),
    );
    root.insert(
        "prev_state_hash".to_string(),
        Value::String(state.prev_state_hash.clone()),
    );
    Value::Object(root)
}

/// Reject any number that does not fit an integer.
fn reject_non_integers(v: &Value, path: &str) -> Result<(), KernelError> {
    match v {
        Value::Number(n) => {
            if !n.is_i64() && !n.is_u64() {
                return Err(KernelError::OutOfRangeFixedPoint {
                    field: path.to_string(),
                    detail: format!("non-integer number {n} in canonical output"),
                });
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                reject_non_integers(item, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (k, item) in map {
                reject_non_integers(item, &format!("{path}.{k}"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEdge, DependencyKind, Role, ScaleStage};

    fn role(id: &str) -> Role {
        Role {
            id: id.to_string(),
            name: id.to_uppercase(),
            purpose: String::new(),
            responsibilities: vec![format!("{id}_default")],
            required_inputs: Vec::new(),
            produced_outputs: Vec::new(),
            scale_stage: ScaleStage::Seed,
            active: true,
        }
    }

    #[test]
    fn empty_state_hash_is_stable_across_calls() {
        let state = OrgState::default();
        let h1 = canonical_hash(&state).unwrap();
        let h2 = canonical_hash(&state).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn structurally_equal_states_share_bytes() {
        let mut a = OrgState::default();
        let mut b = OrgState::default();

        let mut r = role("ops");
        r.responsibilities = vec!["triage".into(), "billing".into()];
        a.roles.insert("ops".into(), r.clone());
        r.responsibilities = vec!["billing".into(), "triage".into()];
        b.roles.insert("ops".into(), r);

        a.dependencies.push(DependencyEdge {
            from_role_id: "ops".into(),
            to_role_id: "ops2".into(),
            dependency_type: DependencyKind::Operational,
            critical: false,
        });
        b.dependencies = a.dependencies.clone();
        a.roles.insert("ops2".into(), role("ops2"));
        b.roles.insert("ops2".into(), role("ops2"));

        assert_eq!(
            canonical_serialize(&a).unwrap(),
            canonical_serialize(&b).unwrap()
        );
    }

    #[test]
    fn output_has_no_whitespace_or_floats() {
        let mut state = OrgState::default();
        state.roles.insert("a".into(), role("a"));
        let bytes = canonical_serialize(&state).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains(' '));
        assert!(!text.contains('\n'));
        assert!(!text.contains(".0"));
    }

    #[test]
    fn dependency_order_is_canonical() {
        let mut state = OrgState::default();
        state.roles.insert("a".into(), role("a"));
        state.roles.insert("b".into(), role("b"));
        state.dependencies.push(DependencyEdge {
            from_role_id: "b".into(),
            to_role_id: "a".into(),
            dependency_type: DependencyKind::Operational,
            critical: false,
        });
        state.dependencies.push(DependencyEdge {
            from_role_id: "a".into(),
            to_role_id: "b".into(),
            dependency_type: DependencyKind::Governance,
            critical: false,
        });
        let text = String::from_utf8(canonical_serialize(&state).unwrap()).unwrap();
        let a_pos = text.find("\"from_role_id\":\"a\"").unwrap();
        let b_pos = text.find("\"from_role_id\":\"b\"").unwrap();
        assert!(a_pos < b_pos);
    }
}

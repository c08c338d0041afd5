/// Diagnostics snapshot of state health.
///
/// All density values: int64 fixed-point.

use serde::{Deserialize, Serialize};

use crate::domain::{DependencyKind, OrgState};
use crate::fixedpoint::SCALE;
use crate::graph::{isolated_roles, structural_density};

/// Density above which the interdependence warning fires: 0.7 * SCALE.
const DENSITY_WARNING_THRESHOLD: i64 = 7 * SCALE / 10;

/// Debt above which the suppressed-adaptation warning fires.
const DEBT_WARNING_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub role_count: i64,
    pub active_role_count: i64,
    pub structural_density: i64,
    pub structural_debt: i64,
    pub isolated_roles: Vec<String>,
    pub governance_edges: i64,
    pub warnings: Vec<String>,
}

/// Summarise the current state health.
pub fn compute_diagnostics(state: &OrgState) -> Diagnostics {
    let density = structural_density(state);
    let isolated = isolated_roles(state);
    let governance_edges = state
        .dependencies
        .iter()
        .filter(|d| d.dependency_type == DependencyKind::Governance)
        .count() as i64;

    let mut warnings: Vec<String> = Vec::new();
    if density > DENSITY_WARNING_THRESHOLD {
        warnings.push(format!(
            "High structural density ({density}) — fragile interdependence"
        ));
    }
    if state.structural_debt > DEBT_WARNING_THRESHOLD {
        warnings.push(format!(
            "Structural debt={} — organization accumulating suppressed adaptation",
            state.structural_debt
        ));
    }
    if !isolated.is_empty() {
        warnings.push(format!(
            "{} isolated role(s): {}",
            isolated.len(),
            isolated.join(", ")
        ));
    }
    let inactive: Vec<&str> = state
        .roles
        .values()
        .filter(|r| !r.active)
        .map(|r| r.id.as_str())
        .collect();
    if !inactive.is_empty() {
        warnings.push(format!(
            "{} inactive role(s): {}",
            inactive.len(),
            inactive.join(", ")
        ));
    }

    Diagnostics {
        role_count: state.roles.len() as i64,
        active_role_count: state.roles.values().filter(|r| r.active).count() as i64,
        structural_density: density,
        structural_debt: state.structural_debt,
        isolated_roles: isolated,
        governance_edges,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEdge, Role, ScaleStage};

    #[test]
    fn counts_and_warnings() {
        let mut state = OrgState::default();
        for id in ["a", "b"] {
            state.roles.insert(
                id.to_string(),
                Role {
                    id: id.to_string(),
                    name: id.to_string(),
                    purpose: String::new(),
                    responsibilities: vec![format!("{id}_default")],
                    required_inputs: Vec::new(),
                    produced_outputs: Vec::new(),
                    scale_stage: ScaleStage::Seed,
                    active: true,
                },
            );
        }
        state.roles.get_mut("b").unwrap().active = false;
        state.dependencies.push(DependencyEdge {
            from_role_id: "a".into(),
            to_role_id: "b".into(),
            dependency_type: DependencyKind::Governance,
            critical: false,
        });
        state.structural_debt = 9;

        let diag = compute_diagnostics(&state);
        assert_eq!(diag.role_count, 2);
        assert_eq!(diag.active_role_count, 1);
        assert_eq!(diag.governance_edges, 1);
        assert!(diag.isolated_roles.is_empty());
        assert!(diag.warnings.iter().any(|w| w.contains("debt=9")));
        assert!(diag.warnings.iter().any(|w| w.contains("inactive")));
    }
}

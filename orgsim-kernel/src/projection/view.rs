/// Department view assembly.
///
/// Collapses structural clusters into department records, overlays
/// semantic labels when a classification source is supplied, and derives
/// department-level edge metrics. Never mutates kernel state.
///
/// All density and heat values: int64 fixed-point (real * SCALE).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DependencyEdge, OrgState, ScaleStage};
use crate::fixedpoint::SCALE;
use crate::projection::classify::ClassificationSource;
use crate::projection::cluster::{canonical_cluster_hash, cluster_roles};
use crate::projection::label::{label_clusters, UNCLASSIFIED};

/// Enriched department — structural cluster + semantic label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub role_ids: Vec<String>,
    pub internal_density: i64,
    pub external_dependencies: i64,
    pub scale_stage: ScaleStage,
    pub semantic_label: String,
    pub label_confidence: i64,
}

/// Full projection of the role graph into departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentView {
    pub version: u64,
    pub departments: Vec<Department>,
    pub role_to_department: BTreeMap<String, String>,
    pub role_to_cluster: BTreeMap<String, String>,
    pub inter_department_edges: Vec<(String, String)>,
    pub boundary_heat: BTreeMap<String, i64>,
    pub cluster_hash: String,
}

/// Build a DepartmentView from the current state.
///
/// If a classification source is provided, clusters are labeled by
/// majority vote; otherwise every department is Unclassified.
pub fn build_view(
    state: &OrgState,
    db: Option<&dyn ClassificationSource>,
) -> DepartmentView {
    let version = state.event_count;

    if state.roles.is_empty() {
        return DepartmentView {
            version,
            departments: Vec::new(),
            role_to_department: BTreeMap::new(),
            role_to_cluster: BTreeMap::new(),
            inter_department_edges: Vec::new(),
            boundary_heat: BTreeMap::new(),
            cluster_hash: String::new(),
        };
    }

    let clusters = cluster_roles(state);
    let cluster_hash = canonical_cluster_hash(&clusters);
    let labeled = db.map(|source| label_clusters(&clusters, source));

    let mut departments: Vec<Department> = Vec::new();
    let mut role_to_department: BTreeMap<String, String> = BTreeMap::new();
    let mut role_to_cluster: BTreeMap<String, String> = BTreeMap::new();

    for (idx, cluster) in clusters.iter().enumerate() {
        let dept_id = format!("dept_{idx}");

        let (semantic_label, label_confidence) = labeled
            .as_deref()
            .and_then(|lcs| lcs.iter().find(|lc| lc.cluster_id == cluster.id))
            .map(|lc| (lc.dominant_label.clone(), lc.label_confidence))
            .unwrap_or_else(|| (UNCLASSIFIED.to_string(), 0));

        let scale_stage = state
            .roles
            .get(&cluster.role_ids[0])
            .map(|r| r.scale_stage)
            .unwrap_or_default();

        departments.push(Department {
            id: dept_id.clone(),
            role_ids: cluster.role_ids.clone(),
            internal_density: cluster.internal_density,
            external_dependencies: cluster.external_edge_count,
            scale_stage,
            semantic_label,
            label_confidence,
        });

        for rid in &cluster.role_ids {
            role_to_department.insert(rid.clone(), dept_id.clone());
            role_to_cluster.insert(rid.clone(), cluster.id.clone());
        }
    }

    let inter_department_edges =
        inter_department_edges(&role_to_department, &state.dependencies);
    let boundary_heat =
        boundary_heat(&departments, &role_to_department, &state.dependencies);

    DepartmentView {
        version,
        departments,
        role_to_department,
        role_to_cluster,
        inter_department_edges,
        boundary_heat,
        cluster_hash,
    }
}

/// Collapse role-level edges into department-level edges, deduplicated
/// and sorted.
fn inter_department_edges(
    role_to_dept: &BTreeMap<String, String>,
    dependencies: &[DependencyEdge],
) -> Vec<(String, String)> {
    let mut seen: std::collections::BTreeSet<(String, String)> =
        std::collections::BTreeSet::new();
    for edge in dependencies {
        let (Some(from), Some(to)) = (
            role_to_dept.get(&edge.from_role_id),
            role_to_dept.get(&edge.to_role_id),
        ) else {
            continue;
        };
        if from != to {
            seen.insert((from.clone(), to.clone()));
        }
    }
    seen.into_iter().collect()
}

/// Per department: cross-edges * SCALE / total edges touching it.
///
/// Range 0..SCALE. 0 = closed cluster, SCALE = fully externally dependent.
fn boundary_heat(
    departments: &[Department],
    role_to_dept: &BTreeMap<String, String>,
    dependencies: &[DependencyEdge],
) -> BTreeMap<String, i64> {
    let mut external: BTreeMap<&str, i64> = BTreeMap::new();
    let mut total: BTreeMap<&str, i64> = BTreeMap::new();
    for d in departments {
        external.insert(&d.id, 0);
        total.insert(&d.id, 0);
    }

    for edge in dependencies {
        let (Some(from), Some(to)) = (
            role_to_dept.get(&edge.from_role_id),
            role_to_dept.get(&edge.to_role_id),
        ) else {
            continue;
        };
        *total.entry(from).or_insert(0) += 1;
        *total.entry(to).or_insert(0) += 1;
        if from != to {
            *external.entry(from).or_insert(0) += 1;
            *external.entry(to).or_insert(0) += 1;
        }
    }

    departments
        .iter()
        .map(|d| {
            let t = total.get(d.id.as_str()).copied().unwrap_or(0);
            let heat = if t == 0 {
                0
            } else {
                external.get(d.id.as_str()).copied().unwrap_or(0) * SCALE / t
            };
            (d.id.clone(), heat)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyKind, Role};
    use crate::projection::classify::{ClassificationDb, RoleClassification};

    fn state_with(roles: &[&str], edges: &[(&str, &str)]) -> OrgState {
        let mut state = OrgState::default();
        for id in roles {
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
        for (from, to) in edges {
            state.dependencies.push(DependencyEdge {
                from_role_id: from.to_string(),
                to_role_id: to.to_string(),
                dependency_type: DependencyKind::Operational,
                critical: false,
            });
        }
        state
    }

    #[test]
    fn empty_state_builds_empty_view() {
        let view = build_view(&OrgState::default(), None);
        assert!(view.departments.is_empty());
        assert!(view.cluster_hash.is_empty());
    }

    #[test]
    fn every_active_role_is_assigned_exactly_once() {
        let state = state_with(&["a", "b", "c"], &[("a", "b")]);
        let view = build_view(&state, None);

        let active: Vec<&str> = state.active_role_ids();
        assert_eq!(view.role_to_department.len(), active.len());
        for rid in active {
            assert!(view.role_to_department.contains_key(rid));
        }
        for dept in &view.departments {
            assert!(!dept.role_ids.is_empty());
            assert_eq!(dept.semantic_label, UNCLASSIFIED);
        }
    }

    #[test]
    fn labels_flow_from_classification_source() {
        let state = state_with(&["a", "b"], &[("a", "b")]);
        let mut db = ClassificationDb::new();
        db.register(RoleClassification {
            role_id: "a".into(),
            department_label: "Ops".into(),
            functional_area: String::new(),
            tags: Vec::new(),
        });

        let view = build_view(&state, Some(&db));
        assert_eq!(view.departments.len(), 1);
        assert_eq!(view.departments[0].semantic_label, "Ops");
        assert_eq!(view.departments[0].label_confidence, SCALE / 2);
    }

    #[test]
    fn boundary_heat_tracks_cross_edges() {
        // Two 2-role departments with one bridge edge.
        let state = state_with(
            &["a1", "a2", "b1", "b2"],
            &[("a1", "a2"), ("a2", "a1"), ("b1", "b2"), ("b2", "b1"), ("a1", "b1")],
        );
        let view = build_view(&state, None);
        assert_eq!(view.departments.len(), 2);
        assert_eq!(view.inter_department_edges.len(), 1);
        // Internal edges count both endpoints: 5 touches per department,
        // 1 of them external.
        for heat in view.boundary_heat.values() {
            assert_eq!(*heat, SCALE / 5);
        }
    }
}

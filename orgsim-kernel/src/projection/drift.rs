/// Drift detection — declared vs structural divergence.
///
/// Compares classification labels (declared departments) against
/// structural cluster labels (emergent departments). Direction is never
/// reversed: the structural partition is the observation, the declared
/// label is the claim, drift is the gap between them.
///
/// All ratio values: int64 fixed-point (real * SCALE).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::OrgState;
use crate::fixedpoint::SCALE;
use crate::projection::classify::ClassificationSource;
use crate::projection::label::LabeledCluster;

/// Minimum dependency edges between two declared departments inside one
/// cluster before the pair counts as a hidden coupling.
pub const HIDDEN_COUPLING_MIN_EDGES: i64 = 1;

/// Per-role divergence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEntry {
    pub role_id: String,
    pub declared_department: String,
    pub structural_cluster_id: String,
    pub structural_cluster_label: String,
    pub is_divergent: bool,
}

/// Aggregate drift analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub entries: Vec<DriftEntry>,
    pub divergent_count: i64,
    pub total_count: i64,
    pub divergence_ratio: i64, // fixed-point * SCALE
    pub phantom_departments: Vec<String>,
    pub hidden_couplings: Vec<(String, String)>,
}

/// Compare declared department labels against structural cluster labels.
pub fn compute_drift(
    state: &OrgState,
    labeled_clusters: &[LabeledCluster],
    db: &dyn ClassificationSource,
) -> DriftReport {
    let mut role_to_cluster: BTreeMap<&str, &LabeledCluster> = BTreeMap::new();
    for lc in labeled_clusters {
        for rid in &lc.role_ids {
            role_to_cluster.insert(rid, lc);
        }
    }

    // Per-role entries over classified roles present in some cluster.
    let all_db = db.all();
    let mut entries: Vec<DriftEntry> = Vec::new();
    for (rid, classification) in all_db {
        let Some(cluster) = role_to_cluster.get(rid.as_str()) else {
            // Classified but unclustered — typically an inactive role.
            continue;
        };
        let declared = classification.department_label.clone();
        let structural = cluster.dominant_label.clone();
        entries.push(DriftEntry {
            role_id: rid.clone(),
            declared_department: declared.clone(),
            structural_cluster_id: cluster.cluster_id.clone(),
            is_divergent: declared != structural,
            structural_cluster_label: structural,
        });
    }

    let total_count = entries.len() as i64;
    let divergent_count = entries.iter().filter(|e| e.is_divergent).count() as i64;
    let divergence_ratio = if total_count == 0 {
        0
    } else {
        divergent_count * SCALE / total_count
    };

    // Phantom departments: declared labels with zero structural support.
    let declared_labels: BTreeSet<&str> = all_db
        .values()
        .map(|c| c.department_label.as_str())
        .collect();
    let structural_labels: BTreeSet<&str> = labeled_clusters
        .iter()
        .map(|lc| lc.dominant_label.as_str())
        .collect();
    let phantom_departments: Vec<String> = declared_labels
        .difference(&structural_labels)
        .map(|s| s.to_string())
        .collect();

    // Hidden couplings: declared-separate departments sharing a cluster
    // with enough edges between their role sets inside that cluster.
    let mut hidden: BTreeSet<(String, String)> = BTreeSet::new();
    for lc in labeled_clusters {
        let mut dept_roles: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for rid in &lc.role_ids {
            if let Some(c) = all_db.get(rid) {
                dept_roles
                    .entry(c.department_label.as_str())
                    .or_default()
                    .insert(rid.as_str());
            }
        }
        let depts: Vec<&str> = dept_roles.keys().copied().collect();
        for i in 0..depts.len() {
            for j in (i + 1)..depts.len() {
                let roles_a = &dept_roles[depts[i]];
                let roles_b = &dept_roles[depts[j]];
                let edges = state
                    .dependencies
                    .iter()
                    .filter(|d| {
                        let from = d.from_role_id.as_str();
                        let to = d.to_role_id.as_str();
                        (roles_a.contains(from) && roles_b.contains(to))
                            || (roles_b.contains(from) && roles_a.contains(to))
                    })
                    .count() as i64;
                if edges >= HIDDEN_COUPLING_MIN_EDGES {
                    hidden.insert((depts[i].to_string(), depts[j].to_string()));
                }
            }
        }
    }

    DriftReport {
        entries,
        divergent_count,
        total_count,
        divergence_ratio,
        phantom_departments,
        hidden_couplings: hidden.into_iter().collect(),
    }
}

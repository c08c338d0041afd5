/// Semantic labeling — post-cluster label assignment.
///
/// Runs AFTER structural partitioning is complete and never influences it.
/// Label assignment: majority vote of department labels across the
/// cluster's members; ties break lexicographically; confidence divides by
/// total members, not just labeled ones.
///
/// All confidence values: int64 fixed-point (real * SCALE).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixedpoint::SCALE;
use crate::projection::classify::ClassificationSource;
use crate::projection::cluster::Cluster;

/// Label applied when no member of a cluster is classified.
pub const UNCLASSIFIED: &str = "Unclassified";

/// A structural cluster enriched with its semantic label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledCluster {
    pub cluster_id: String,
    pub role_ids: Vec<String>,
    pub dominant_label: String,
    pub label_confidence: i64, // fixed-point * SCALE
    pub label_distribution: BTreeMap<String, i64>,
}

/// Assign semantic labels to structural clusters.
///
/// Returns one entry per cluster, sorted by cluster id.
pub fn label_clusters(
    clusters: &[Cluster],
    db: &dyn ClassificationSource,
) -> Vec<LabeledCluster> {
    let mut result: Vec<LabeledCluster> = Vec::new();

    for cluster in clusters {
        let mut label_counts: BTreeMap<String, i64> = BTreeMap::new();
        for rid in &cluster.role_ids {
            if let Some(classification) = db.get(rid) {
                *label_counts
                    .entry(classification.department_label.clone())
                    .or_insert(0) += 1;
            }
        }

        let total_roles = cluster.role_ids.len() as i64;

        if label_counts.is_empty() {
            result.push(LabeledCluster {
                cluster_id: cluster.id.clone(),
                role_ids: cluster.role_ids.clone(),
                dominant_label: UNCLASSIFIED.to_string(),
                label_confidence: 0,
                label_distribution: BTreeMap::new(),
            });
            continue;
        }

        // Majority vote; iteration is sorted, so on a tie the
        // lexicographically first label wins.
        let mut dominant_label = String::new();
        let mut dominant_count = 0i64;
        for (label, count) in &label_counts {
            if *count > dominant_count {
                dominant_label = label.clone();
                dominant_count = *count;
            }
        }

        let confidence = dominant_count * SCALE / total_roles;

        result.push(LabeledCluster {
            cluster_id: cluster.id.clone(),
            role_ids: cluster.role_ids.clone(),
            dominant_label,
            label_confidence: confidence,
            label_distribution: label_counts,
        });
    }

    result.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    result
}

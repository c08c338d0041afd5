/// Deterministic structural clustering.
///
/// Pure graph-based partitioning over OrgState. No semantic signals.
/// No randomness. No hash-map iteration order is ever relied upon.
///
/// Algorithm:
///   1. Weakly-connected components over the undirected projection
///      (BFS, sorted iteration)
///   2. Components above SPLIT_MIN: recursive bipartition scored by
///      summed partition density, greedy vertex-moving refinement
///   3. Final pass: greedy reassignment of each role to its densest
///      neighbour cluster, in canonical order, until stable or a step cap
///   4. Cluster id = SHA-256 of sorted role ids joined with '|'
///
/// All density values: int64 fixed-point (real * SCALE).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::canonical::hex_digest;
use crate::domain::OrgState;
use crate::fixedpoint::SCALE;

// ── Configuration ─────────────────────────────────────────────
//
// These values are part of the kernel version identity: changing any of
// them changes cluster output and therefore golden hashes.

/// Components of this size or smaller are never split.
pub const SPLIT_MIN: usize = 2;

/// Minimum component density before attempting bipartition: 0.1 * SCALE.
pub const MIN_DENSITY_FOR_SPLIT: i64 = 1000;

/// Recursion cap for bipartitioning.
pub const MAX_BIPARTITION_DEPTH: u32 = 10;

/// A greedy move must improve the fixed-point score by more than this.
pub const REFINE_EPSILON: i64 = 0;

/// Maximum reassignment passes in the final refinement stage.
pub const REASSIGN_STEP_CAP: u32 = 32;

/// Pure structural cluster — output of graph-based partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// First 16 hex chars of SHA-256 over sorted role ids joined with '|'.
    pub id: String,
    pub role_ids: Vec<String>, // sorted
    pub internal_density: i64, // fixed-point
    pub external_edge_count: i64,
}

type EdgeSet = BTreeSet<(String, String)>;
type Adjacency = BTreeMap<String, BTreeSet<String>>;

// ── Public API ────────────────────────────────────────────────

/// Deterministic clustering of active roles into structural groups.
pub fn cluster_roles(state: &OrgState) -> Vec<Cluster> {
    let active: Vec<String> = state
        .active_role_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    if active.is_empty() {
        return Vec::new();
    }
    let active_set: BTreeSet<&str> = active.iter().map(String::as_str).collect();

    let mut adj: Adjacency = active
        .iter()
        .map(|rid| (rid.clone(), BTreeSet::new()))
        .collect();
    let mut edge_set: EdgeSet = BTreeSet::new();
    for edge in &state.dependencies {
        if active_set.contains(edge.from_role_id.as_str())
            && active_set.contains(edge.to_role_id.as_str())
        {
            adj.get_mut(&edge.from_role_id)
                .expect("adjacency seeded with all active roles")
                .insert(edge.to_role_id.clone());
            adj.get_mut(&edge.to_role_id)
                .expect("adjacency seeded with all active roles")
                .insert(edge.from_role_id.clone());
            edge_set.insert((edge.from_role_id.clone(), edge.to_role_id.clone()));
        }
    }

    let mut groups: Vec<Vec<String>> = Vec::new();
    for component in connected_components(&active, &adj) {
        if component.len() <= SPLIT_MIN
            || internal_density(&component, &edge_set) < MIN_DENSITY_FOR_SPLIT
        {
            groups.push(component);
        } else {
            groups.extend(bipartition_recursive(component, &edge_set, 0));
        }
    }

    reassign_to_densest_neighbour(&mut groups, &adj, &edge_set);

    let mut clusters: Vec<Cluster> = groups
        .into_iter()
        .map(|g| make_cluster(g, &edge_set))
        .collect();
    clusters.sort_by(|a, b| a.role_ids.cmp(&b.role_ids));
    clusters
}

/// SHA-256 of the canonical cluster representation (full hex).
pub fn canonical_cluster_hash(clusters: &[Cluster]) -> String {
    let mut sorted: Vec<&Cluster> = clusters.iter().collect();
    sorted.sort_by(|a, b| a.role_ids.cmp(&b.role_ids));

    let canonical: Vec<serde_json::Value> = sorted
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id,
                "role_ids": c.role_ids,
                "internal_density": c.internal_density,
                "external_edge_count": c.external_edge_count,
            })
        })
        .collect();
    let raw = serde_json::to_string(&canonical)
        .expect("cluster canonical form always serializes");
    hex_digest(raw.as_bytes())
}

// ── Cluster construction ──────────────────────────────────────

fn make_cluster(mut role_ids: Vec<String>, edge_set: &EdgeSet) -> Cluster {
    role_ids.sort();
    let density = internal_density(&role_ids, edge_set);
    let members: BTreeSet<&str> = role_ids.iter().map(String::as_str).collect();
    let external = edge_set
        .iter()
        .filter(|(a, b)| members.contains(a.as_str()) != members.contains(b.as_str()))
        .count() as i64;
    let id = hex_digest(role_ids.join("|").as_bytes())[..16].to_string();
    Cluster {
        id,
        role_ids,
        internal_density: density,
        external_edge_count: external,
    }
}

// ── Graph primitives ──────────────────────────────────────────

/// BFS component discovery; deterministic via sorted iteration.
fn connected_components(role_ids: &[String], adj: &Adjacency) -> Vec<Vec<String>> {
    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut components: Vec<Vec<String>> = Vec::new();

    for rid in role_ids {
        if visited.contains(rid.as_str()) {
            continue;
        }
        let mut component: Vec<String> = Vec::new();
        let mut queue: Vec<&str> = vec![rid];
        visited.insert(rid);
        while let Some(node) = queue.pop() {
            component.push(node.to_string());
            if let Some(neighbours) = adj.get(node) {
                for nbr in neighbours {
                    if visited.insert(nbr) {
                        queue.push(nbr);
                    }
                }
            }
        }
        component.sort();
        components.push(component);
    }
    components
}

/// (edges inside group * SCALE) / (n * (n - 1)); 0 below two members.
fn internal_density(group: &[String], edge_set: &EdgeSet) -> i64 {
    let n = group.len() as i64;
    if n < 2 {
        return 0;
    }
    let members: BTreeSet<&str> = group.iter().map(String::as_str).collect();
    let internal = edge_set
        .iter()
        .filter(|(a, b)| members.contains(a.as_str()) && members.contains(b.as_str()))
        .count() as i64;
    internal * SCALE / (n * (n - 1))
}

/// Score of a split: density(A) + density(B). Higher is better.
///
/// Favours splits where both partitions are internally dense: a fully
/// connected clique scores SCALE whole, but two cliques score 2 * SCALE.
fn partition_quality(part_a: &[String], part_b: &[String], edge_set: &EdgeSet) -> i64 {
    internal_density(part_a, edge_set) + internal_density(part_b, edge_set)
}

// ── Bipartition ───────────────────────────────────────────────

fn bipartition_recursive(
    component: Vec<String>,
    edge_set: &EdgeSet,
    depth: u32,
) -> Vec<Vec<String>> {
    if component.len() <= 1 || depth >= MAX_BIPARTITION_DEPTH {
        return vec![component];
    }

    let single_density = internal_density(&component, edge_set);
    let single_baseline = single_density * 2;

    // Initial split at the lexicographic midpoint, then greedy refinement.
    let mid = component.len() / 2;
    let part_a: Vec<String> = component[..mid].to_vec();
    let part_b: Vec<String> = component[mid..].to_vec();
    let (part_a, part_b) = greedy_refine(part_a, part_b, edge_set);

    if part_a.is_empty() || part_b.is_empty() {
        return vec![component];
    }

    // A split is accepted only when the average partition density strictly
    // exceeds the unsplit density.
    if partition_quality(&part_a, &part_b, edge_set) <= single_baseline {
        return vec![component];
    }

    let mut result = bipartition_recursive(part_a, edge_set, depth + 1);
    result.extend(bipartition_recursive(part_b, edge_set, depth + 1));
    result
}

/// Greedy vertex-moving refinement, sorted iteration, first improving
/// move wins each round.
fn greedy_refine(
    mut part_a: Vec<String>,
    mut part_b: Vec<String>,
    edge_set: &EdgeSet,
) -> (Vec<String>, Vec<String>) {
    part_a.sort();
    part_b.sort();

    let mut improved = true;
    while improved {
        improved = false;
        let current = partition_quality(&part_a, &part_b, edge_set);

        for idx in 0..part_a.len() {
            if part_a.len() <= 1 {
                break;
            }
            let rid = part_a[idx].clone();
            let new_a: Vec<String> = part_a.iter().filter(|r| **r != rid).cloned().collect();
            let mut new_b = part_b.clone();
            new_b.push(rid);
            new_b.sort();
            if partition_quality(&new_a, &new_b, edge_set) > current + REFINE_EPSILON {
                part_a = new_a;
                part_b = new_b;
                improved = true;
                break;
            }
        }
        if improved {
            continue;
        }

        for idx in 0..part_b.len() {
            if part_b.len() <= 1 {
                break;
            }
            let rid = part_b[idx].clone();
            let new_b: Vec<String> = part_b.iter().filter(|r| **r != rid).cloned().collect();
            let mut new_a = part_a.clone();
            new_a.push(rid);
            new_a.sort();
            if partition_quality(&new_a, &new_b, edge_set) > current + REFINE_EPSILON {
                part_a = new_a;
                part_b = new_b;
                improved = true;
                break;
            }
        }
    }

    (part_a, part_b)
}

// ── Final reassignment pass ───────────────────────────────────

/// Move each role to its densest neighbour cluster, one canonical-order
/// pass at a time, until stable or REASSIGN_STEP_CAP passes.
fn reassign_to_densest_neighbour(
    groups: &mut Vec<Vec<String>>,
    adj: &Adjacency,
    edge_set: &EdgeSet,
) {
    let mut owner: BTreeMap<String, usize> = BTreeMap::new();
    for (gi, group) in groups.iter().enumerate() {
        for rid in group {
            owner.insert(rid.clone(), gi);
        }
    }
    let all_roles: Vec<String> = owner.keys().cloned().collect();

    for _ in 0..REASSIGN_STEP_CAP {
        let mut moved = false;

        for rid in &all_roles {
            let current_gi = owner[rid];
            if groups[current_gi].len() <= 1 {
                continue;
            }

            let mut candidate_groups: BTreeSet<usize> = BTreeSet::new();
            if let Some(neighbours) = adj.get(rid) {
                for nbr in neighbours {
                    let gi = owner[nbr];
                    if gi != current_gi {
                        candidate_groups.insert(gi);
                    }
                }
            }
            if candidate_groups.is_empty() {
                continue;
            }

            let current_density = internal_density(&groups[current_gi], edge_set);
            let mut best: Option<(i64, usize)> = None;
            for gi in candidate_groups {
                let mut trial = groups[gi].clone();
                trial.push(rid.clone());
                trial.sort();
                let d = internal_density(&trial, edge_set);
                // Ascending index iteration: the first group wins ties.
                if best.map(|(bd, _)| d > bd).unwrap_or(true) {
                    best = Some((d, gi));
                }
            }

            if let Some((best_density, best_gi)) = best {
                if best_density > current_density + REFINE_EPSILON {
                    groups[current_gi].retain(|r| r != rid);
                    groups[best_gi].push(rid.clone());
                    groups[best_gi].sort();
                    owner.insert(rid.clone(), best_gi);
                    moved = true;
                }
            }
        }

        if !moved {
            break;
        }
    }

    groups.retain(|g| !g.is_empty());
}

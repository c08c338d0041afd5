/// Graph analysis.
///
/// Pure graph utilities over the dependency graph.
/// All density values: int64 fixed-point (real * SCALE).

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{DependencyEdge, OrgState, Role};
use crate::fixedpoint::SCALE;

// ---------------------------------------------------------------------------
// Structural density
// ---------------------------------------------------------------------------

/// Structural density = edges * SCALE / (n * (n - 1)) for n >= 2, else 0.
pub fn structural_density(state: &OrgState) -> i64 {
    let n = state.roles.len() as i64;
    if n < 2 {
        return 0;
    }
    let max_edges = n * (n - 1);
    (state.dependencies.len() as i64) * SCALE / max_edges
}

/// Density of a role's 1-hop ego subgraph (fixed-point).
///
/// Ego nodes are the role plus its undirected neighbours; density counts
/// directed edges among ego nodes against k * (k - 1) potential.
pub fn ego_density(role_id: &str, state: &OrgState) -> i64 {
    let mut ego: BTreeSet<&str> = BTreeSet::new();
    ego.insert(role_id);
    for d in &state.dependencies {
        if d.from_role_id == role_id {
            ego.insert(&d.to_role_id);
        } else if d.to_role_id == role_id {
            ego.insert(&d.from_role_id);
        }
    }
    let k = ego.len() as i64;
    if k < 2 {
        return 0;
    }
    let internal = state
        .dependencies
        .iter()
        .filter(|d| {
            ego.contains(d.from_role_id.as_str()) && ego.contains(d.to_role_id.as_str())
        })
        .count() as i64;
    internal * SCALE / (k * (k - 1))
}

// ---------------------------------------------------------------------------
// Degrees and isolation
// ---------------------------------------------------------------------------

/// Number of dependencies targeting `role_id` whose source role is active.
pub fn active_fan_in(role_id: &str, state: &OrgState) -> i64 {
    state
        .dependencies
        .iter()
        .filter(|d| {
            d.to_role_id == role_id
                && state
                    .roles
                    .get(&d.from_role_id)
                    .map(|r| r.active)
                    .unwrap_or(false)
        })
        .count() as i64
}

/// Active role ids with zero in- and zero out-degree, sorted.
pub fn isolated_roles(state: &OrgState) -> Vec<String> {
    let mut connected: BTreeSet<&str> = BTreeSet::new();
    for edge in &state.dependencies {
        connected.insert(&edge.from_role_id);
        connected.insert(&edge.to_role_id);
    }
    state
        .roles
        .values()
        .filter(|r| r.active && !connected.contains(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Critical-cycle detection
// ---------------------------------------------------------------------------

const WHITE: u8 = 0;
const GREY: u8 = 1;
const BLACK: u8 = 2;

/// Find a directed cycle whose edges are all critical, if one exists.
///
/// Iterative DFS with grey/black colouring; visitation order is canonical
/// role-id order so the reported cycle is deterministic.
pub fn find_critical_cycle(
    roles: &BTreeMap<String, Role>,
    dependencies: &[DependencyEdge],
) -> Option<Vec<String>> {
    let mut adj: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in dependencies {
        if edge.critical {
            adj.entry(&edge.from_role_id)
                .or_default()
                .push(&edge.to_role_id);
        }
    }
    for list in adj.values_mut() {
        list.sort();
        list.dedup();
    }

    let mut colour: BTreeMap<&str, u8> = BTreeMap::new();
    for rid in roles.keys() {
        colour.insert(rid.as_str(), WHITE);
    }

    for start in roles.keys() {
        let start = start.as_str();
        if colour.get(start).copied().unwrap_or(WHITE) != WHITE {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        colour.insert(start, GREY);

        while let Some((node, idx)) = stack.last().copied() {
            let neighbours: &[&str] = adj.get(node).map(|v| v.as_slice()).unwrap_or(&[]);
            if idx < neighbours.len() {
                stack.last_mut().unwrap().1 = idx + 1;
                let nbr = neighbours[idx];
                match colour.get(nbr).copied().unwrap_or(WHITE) {
                    GREY => {
                        // Reconstruct the cycle from the stack.
                        let mut cycle = vec![nbr.to_string()];
                        for (sn, _) in stack.iter().rev() {
                            cycle.push(sn.to_string());
                            if *sn == nbr {
                                break;
                            }
                        }
                        cycle.reverse();
                        return Some(cycle);
                    }
                    WHITE => {
                        colour.insert(nbr, GREY);
                        stack.push((nbr, 0));
                    }
                    _ => {}
                }
            } else {
                colour.insert(node, BLACK);
                stack.pop();
            }
        }
    }
    None
}

/// True if the critical-edge subgraph is a DAG.
pub fn critical_subgraph_is_acyclic(state: &OrgState) -> bool {
    find_critical_cycle(&state.roles, &state.dependencies).is_none()
}

/// Core domain types.
///
/// Pure data. No behaviour, no transition logic.
/// All numeric values: i64 fixed-point (SCALE = 10_000).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixedpoint::SCALE;

// ── Core Domain Types ──────────────────────────────────────────────

/// Lifecycle stage of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleStage {
    Seed,
    Growth,
    Structured,
    Mature,
}

impl Default for ScaleStage {
    fn default() -> Self {
        ScaleStage::Seed
    }
}

impl ScaleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleStage::Seed => "seed",
            ScaleStage::Growth => "growth",
            ScaleStage::Structured => "structured",
            ScaleStage::Mature => "mature",
        }
    }
}

/// Kind of a directed dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Governance,
    Informational,
    Operational,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Governance => "governance",
            DependencyKind::Informational => "informational",
            DependencyKind::Operational => "operational",
        }
    }
}

/// True if `id` is non-empty lowercase ASCII alphanumeric plus underscore.
pub fn valid_role_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A single organizational role — the causal unit of structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub purpose: String,
    pub responsibilities: Vec<String>, // sorted
    pub required_inputs: Vec<String>,  // sorted
    pub produced_outputs: Vec<String>, // sorted
    pub scale_stage: ScaleStage,
    pub active: bool,
}

/// Directed dependency between two roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyEdge {
    pub from_role_id: String,
    pub to_role_id: String,
    pub dependency_type: DependencyKind,
    pub critical: bool,
}

impl DependencyEdge {
    /// Canonical sort key: (from, to, type name).
    pub fn sort_key(&self) -> (&str, &str, &'static str) {
        (
            &self.from_role_id,
            &self.to_role_id,
            self.dependency_type.as_str(),
        )
    }
}

/// Resource constraints — int64 fixed-point (real * SCALE).
///
/// Zero until `initialize_constants` seeds the budgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintVector {
    pub capital: i64,
    pub talent: i64,
    pub time: i64,
    pub political_cost: i64,
}

/// All domain thresholds — injected once via the initialize_constants event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConstants {
    pub differentiation_threshold: i64,
    pub compression_limit: i64,
    pub shock_base_multiplier: i64,
    pub shock_density_weight: i64, // fixed-point weight on ego density
    pub shock_deactivation_threshold: i64,
    pub differentiation_cost: i64, // fixed-point, charged to capital and talent
    pub capital: i64,
    pub talent: i64,
    pub time: i64,
    pub political_cost: i64,
}

/// Default weight on ego density in the shock formula: 0.5 * SCALE.
pub const DEFAULT_SHOCK_DENSITY_WEIGHT: i64 = SCALE / 2;

/// Default shock base multiplier.
pub const DEFAULT_SHOCK_BASE_MULTIPLIER: i64 = 1;

/// Shocks above this magnitude deactivate the target role.
pub const DEFAULT_SHOCK_DEACTIVATION_THRESHOLD: i64 = 8;

/// Default capital/talent price of one executed differentiation: 1.0 * SCALE.
pub const DEFAULT_DIFFERENTIATION_COST: i64 = SCALE;

/// Structured, immutable outcome of a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionResult {
    pub event_type: String,
    pub primary_debt: i64,
    pub secondary_debt: i64,
    pub target_density: i64,
    pub suppressed_differentiation: bool,
    pub differentiation_executed: bool,
    pub differentiation_skipped: bool,
    pub compression_executed: bool,
    pub deactivated: bool,
    pub reason: String,
    pub cumulative_debt: i64,
}

impl Default for TransitionResult {
    fn default() -> Self {
        Self {
            event_type: String::new(),
            primary_debt: 0,
            secondary_debt: 0,
            target_density: 0,
            suppressed_differentiation: false,
            differentiation_executed: false,
            differentiation_skipped: false,
            compression_executed: false,
            deactivated: false,
            reason: String::new(),
            cumulative_debt: 0,
        }
    }
}

/// Complete organizational state.
///
/// `prev_state_hash` chains the canonical hashes, so the running hash is
/// recomputable from state alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgState {
    pub constants: Option<DomainConstants>,
    pub roles: BTreeMap<String, Role>,
    pub dependencies: Vec<DependencyEdge>,
    pub constraint_vector: ConstraintVector,
    pub structural_debt: i64,
    pub compression_count: i64,
    pub event_count: u64,
    pub prev_state_hash: String,
}

impl OrgState {
    /// Active role ids in canonical (lexicographic) order.
    pub fn active_role_ids(&self) -> Vec<&str> {
        self.roles
            .values()
            .filter(|r| r.active)
            .map(|r| r.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_id_format() {
        assert!(valid_role_id("eng_1"));
        assert!(valid_role_id("a"));
        assert!(!valid_role_id(""));
        assert!(!valid_role_id("Eng"));
        assert!(!valid_role_id("a-b"));
        assert!(!valid_role_id("a b"));
    }

    #[test]
    fn dependency_kind_names_sort_like_variants() {
        let mut kinds = vec![
            DependencyKind::Operational,
            DependencyKind::Governance,
            DependencyKind::Informational,
        ];
        kinds.sort();
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        let mut sorted_names = names.clone();
        sorted_names.sort();
        assert_eq!(names, sorted_names);
    }

    #[test]
    fn scale_stage_serializes_lowercase() {
        let s = serde_json::to_string(&ScaleStage::Growth).unwrap();
        assert_eq!(s, "\"growth\"");
    }
}

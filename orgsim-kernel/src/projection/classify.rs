/// Semantic classification registry.
///
/// Descriptive metadata for roles. NEVER influences structural clustering
/// and is never written back into kernel state. Injected into the
/// projection stage as a read-only source — no process-wide singletons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Semantic metadata for a single role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleClassification {
    pub role_id: String,
    pub department_label: String,
    #[serde(default)]
    pub functional_area: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Read-only view the projection stage consumes.
pub trait ClassificationSource {
    fn get(&self, role_id: &str) -> Option<&RoleClassification>;
    fn all(&self) -> &BTreeMap<String, RoleClassification>;
}

/// In-memory classification registry.
#[derive(Debug, Clone, Default)]
pub struct ClassificationDb {
    store: BTreeMap<String, RoleClassification>,
}

impl ClassificationDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a role classification.
    pub fn register(&mut self, classification: RoleClassification) {
        self.store
            .insert(classification.role_id.clone(), classification);
    }

    pub fn bulk_register(&mut self, classifications: Vec<RoleClassification>) {
        for c in classifications {
            self.register(c);
        }
    }

    pub fn has(&self, role_id: &str) -> bool {
        self.store.contains_key(role_id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }
}

impl ClassificationSource for ClassificationDb {
    fn get(&self, role_id: &str) -> Option<&RoleClassification> {
        self.store.get(role_id)
    }

    fn all(&self) -> &BTreeMap<String, RoleClassification> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_query() {
        let mut db = ClassificationDb::new();
        db.register(RoleClassification {
            role_id: "eng".into(),
            department_label: "Engineering".into(),
            functional_area: "product".into(),
            tags: vec!["core".into()],
        });
        assert!(db.has("eng"));
        assert_eq!(db.get("eng").unwrap().department_label, "Engineering");
        assert!(db.get("ops").is_none());

        db.register(RoleClassification {
            role_id: "eng".into(),
            department_label: "Platform".into(),
            functional_area: String::new(),
            tags: Vec::new(),
        });
        assert_eq!(db.len(), 1);
        assert_eq!(db.get("eng").unwrap().department_label, "Platform");
    }
}

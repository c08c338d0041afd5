/// Event engine.
///
/// Top-level kernel entry point. Delegates mutation to transitions,
/// validates via invariants, and maintains the running state hash.
///
/// Per-event order: schema check, sequence check, transition, invariant
/// validation, canonical serialize, hash update, commit.

use crate::canonical::canonical_hash;
use crate::domain::{OrgState, TransitionResult};
use crate::error::KernelError;
use crate::events::{EventEnvelope, EventPayload, SCHEMA_VERSION};
use crate::invariants::validate;
use crate::transitions::apply_event as transition_apply;

/// Stateful engine wrapping the pure functional transition layer.
pub struct OrgEngine {
    state: OrgState,
    next_sequence: u64,
    state_hash: String,
}

/// Snapshot of the engine's mutable registers, for discarding a
/// transition whose downstream persistence fails.
#[derive(Clone)]
pub struct EngineCheckpoint {
    state: OrgState,
    next_sequence: u64,
    state_hash: String,
}

impl OrgEngine {
    /// Create a fresh engine over the empty state.
    pub fn new() -> Result<Self, KernelError> {
        let state = OrgState::default();
        let state_hash = canonical_hash(&state)?;
        Ok(Self {
            state,
            next_sequence: 0,
            state_hash,
        })
    }

    pub fn state(&self) -> &OrgState {
        &self.state
    }

    /// Canonical hash of the current state. Opaque version identifier.
    pub fn state_hash(&self) -> &str {
        &self.state_hash
    }

    /// Sequence number the next event must carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn checkpoint(&self) -> EngineCheckpoint {
        EngineCheckpoint {
            state: self.state.clone(),
            next_sequence: self.next_sequence,
            state_hash: self.state_hash.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: EngineCheckpoint) {
        self.state = checkpoint.state;
        self.next_sequence = checkpoint.next_sequence;
        self.state_hash = checkpoint.state_hash;
    }

    /// Apply a single event. On error the engine is untouched.
    pub fn apply_event(
        &mut self,
        event: &EventEnvelope,
    ) -> Result<(&OrgState, TransitionResult), KernelError> {
        // -- Schema enforcement --
        if event.schema_version != SCHEMA_VERSION {
            return Err(KernelError::BadSchema {
                field: "schema_version".to_string(),
                detail: format!(
                    "expected {SCHEMA_VERSION}, got {}",
                    event.schema_version
                ),
            });
        }

        // -- Sequence enforcement: strictly contiguous from 0 --
        let sequence = event.sequence.ok_or_else(|| KernelError::BadSchema {
            field: "sequence".to_string(),
            detail: "sequence must be assigned before apply".to_string(),
        })?;
        if sequence < self.next_sequence {
            return Err(KernelError::SequenceDuplicate { sequence });
        }
        if sequence > self.next_sequence {
            return Err(KernelError::SequenceGap {
                expected: self.next_sequence,
                got: sequence,
            });
        }

        // -- Constants-first enforcement --
        let is_init = matches!(event.payload, EventPayload::InitializeConstants(_));
        if self.state.constants.is_none() && !is_init {
            return Err(KernelError::ConstantsUnset {
                detail: format!(
                    "first event must be initialize_constants, got {}",
                    event.payload.type_name()
                ),
            });
        }

        let (mut new_state, mut result) = transition_apply(&self.state, event)?;
        validate(&new_state)?;

        // -- Hash chain bookkeeping --
        new_state.prev_state_hash = self.state_hash.clone();
        new_state.event_count = self.state.event_count + 1;
        let new_hash = canonical_hash(&new_state)?;

        result.cumulative_debt = new_state.structural_debt;

        self.state = new_state;
        self.state_hash = new_hash;
        self.next_sequence = sequence + 1;

        Ok((&self.state, result))
    }

    /// Event-sourced reconstruction: reset and replay in order.
    pub fn replay(&mut self, events: &[EventEnvelope]) -> Result<&OrgState, KernelError> {
        *self = Self::new()?;
        for event in events {
            self.apply_event(event)?;
        }
        Ok(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AddRolePayload, InitializeConstantsPayload};

    fn init_event(sequence: u64) -> EventEnvelope {
        EventEnvelope {
            schema_version: 1,
            sequence: Some(sequence),
            event_uuid: None,
            timestamp: None,
            payload: EventPayload::InitializeConstants(InitializeConstantsPayload {
                capital: 50000,
                talent: 50000,
                time: 50000,
                political_cost: 50000,
                differentiation_threshold: 3,
                compression_limit: 5,
                shock_base_multiplier: None,
                shock_density_weight: None,
                shock_deactivation_threshold: None,
                differentiation_cost: None,
            }),
        }
    }

    fn add_role_event(sequence: u64, id: &str) -> EventEnvelope {
        EventEnvelope {
            schema_version: 1,
            sequence: Some(sequence),
            event_uuid: None,
            timestamp: None,
            payload: EventPayload::AddRole(AddRolePayload {
                id: id.to_string(),
                name: id.to_uppercase(),
                purpose: String::new(),
                responsibilities: Vec::new(),
                required_inputs: Vec::new(),
                produced_outputs: Vec::new(),
                scale_stage: None,
            }),
        }
    }

    #[test]
    fn first_event_must_initialize_constants() {
        let mut engine = OrgEngine::new().unwrap();
        let before = engine.state_hash().to_string();
        let err = engine.apply_event(&add_role_event(0, "a")).unwrap_err();
        assert_eq!(err.code(), "ConstantsUnset");
        assert_eq!(engine.state_hash(), before);
        assert_eq!(engine.state().event_count, 0);
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let mut engine = OrgEngine::new().unwrap();
        let mut event = init_event(0);
        event.schema_version = 2;
        assert_eq!(engine.apply_event(&event).unwrap_err().code(), "BadSchema");
    }

    #[test]
    fn sequence_gaps_and_duplicates_are_distinct_errors() {
        let mut engine = OrgEngine::new().unwrap();
        engine.apply_event(&init_event(0)).unwrap();

        let err = engine.apply_event(&add_role_event(3, "a")).unwrap_err();
        assert_eq!(err.code(), "SequenceGap");

        let err = engine.apply_event(&add_role_event(0, "a")).unwrap_err();
        assert_eq!(err.code(), "SequenceDuplicate");

        engine.apply_event(&add_role_event(1, "a")).unwrap();
        assert_eq!(engine.next_sequence(), 2);
    }

    #[test]
    fn hash_advances_and_chains_per_event() {
        let mut engine = OrgEngine::new().unwrap();
        let empty_hash = engine.state_hash().to_string();

        engine.apply_event(&init_event(0)).unwrap();
        let after_init = engine.state_hash().to_string();
        assert_ne!(after_init, empty_hash);
        assert_eq!(engine.state().prev_state_hash, empty_hash);

        engine.apply_event(&add_role_event(1, "a")).unwrap();
        assert_eq!(engine.state().prev_state_hash, after_init);
        assert_eq!(engine.state().event_count, 2);
    }

    #[test]
    fn rejected_event_leaves_state_untouched() {
        let mut engine = OrgEngine::new().unwrap();
        engine.apply_event(&init_event(0)).unwrap();
        engine.apply_event(&add_role_event(1, "a")).unwrap();
        let hash = engine.state_hash().to_string();

        let err = engine.apply_event(&add_role_event(2, "a")).unwrap_err();
        assert_eq!(err.code(), "BadRoleId");
        assert_eq!(engine.state_hash(), hash);
        assert_eq!(engine.next_sequence(), 2);
    }

    #[test]
    fn replay_matches_incremental_application() {
        let events = vec![
            init_event(0),
            add_role_event(1, "a"),
            add_role_event(2, "b"),
        ];

        let mut incremental = OrgEngine::new().unwrap();
        for e in &events {
            incremental.apply_event(e).unwrap();
        }

        let mut replayed = OrgEngine::new().unwrap();
        replayed.replay(&events).unwrap();

        assert_eq!(incremental.state_hash(), replayed.state_hash());
        assert_eq!(incremental.state(), replayed.state());
    }

    #[test]
    fn checkpoint_restore_round_trips() {
        let mut engine = OrgEngine::new().unwrap();
        engine.apply_event(&init_event(0)).unwrap();
        let cp = engine.checkpoint();
        let hash = engine.state_hash().to_string();

        engine.apply_event(&add_role_event(1, "a")).unwrap();
        assert_ne!(engine.state_hash(), hash);

        engine.restore(cp);
        assert_eq!(engine.state_hash(), hash);
        assert_eq!(engine.next_sequence(), 1);
    }
}

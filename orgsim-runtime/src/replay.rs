//! Replay — rebuild state from an event stream.
//!
//! Delegates all domain logic to the kernel. No shortcuts, no cached
//! state logic.

use orgsim_kernel::domain::OrgState;
use orgsim_kernel::engine::OrgEngine;
use orgsim_kernel::events::EventEnvelope;

use crate::error::RuntimeError;

/// Rebuild organizational state from an ordered event stream.
///
/// Pure on the event stream: a fresh engine replays every event and the
/// final state plus its canonical hash come back.
pub fn rebuild_state(events: &[EventEnvelope]) -> Result<(OrgState, String), RuntimeError> {
    let mut engine = OrgEngine::new().map_err(RuntimeError::from)?;
    engine.replay(events).map_err(RuntimeError::from)?;
    let hash = engine.state_hash().to_string();
    Ok((engine.state().clone(), hash))
}

/// Rebuild state and return only the canonical hash.
pub fn rebuild_hash(events: &[EventEnvelope]) -> Result<String, RuntimeError> {
    rebuild_state(events).map(|(_, hash)| hash)
}

#![forbid(unsafe_code)]

//! Runtime around the orgsim kernel.
//!
//! Wraps the deterministic kernel with persistence, replay, snapshots,
//! session management and determinism verification.
//!
//! No domain logic lives here — all transitions and invariants are
//! delegated to the kernel.

pub mod error;
pub mod event_store;
pub mod replay;
pub mod session;
pub mod snapshot;
pub mod wire;

pub use error::RuntimeError;
pub use session::{AppendOutcome, Session, SharedSession, StateProjection};

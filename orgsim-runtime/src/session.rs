//! Session orchestrator — single-writer sessions over the kernel.
//!
//! Each session owns one project's event log, snapshots and in-memory
//! state. Apply-before-persist order:
//!   1. engine.apply_event(event)   — typed rejection on failure
//!   2. event_store.append_event()  — only if step 1 succeeded;
//!      an I/O failure here discards the transition via checkpoint
//!   3. stream metadata update      — last sequence + last state hash
//!   4. snapshot at the cadence     — advisory, failures are logged
//!
//! Fatal errors poison the session: further appends refuse until
//! verify_determinism() re-validates the log.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use orgsim_kernel::diagnostics::{compute_diagnostics, Diagnostics};
use orgsim_kernel::domain::{DependencyEdge, Role, TransitionResult};
use orgsim_kernel::engine::OrgEngine;
use orgsim_kernel::error::KernelError;
use orgsim_kernel::events::EventEnvelope;
use orgsim_kernel::projection::{
    build_view, compute_drift, label_clusters, cluster_roles,
    ClassificationSource, DepartmentView, DriftReport,
};

use crate::error::RuntimeError;
use crate::event_store::EventStore;
use crate::replay;
use crate::snapshot;
use crate::wire::{kernel_to_wire, wire_to_kernel};

/// Snapshot cadence when none is configured.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 50;

/// Outcome of a successful (or deduplicated) append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub sequence: u64,
    pub state_hash: String,
    pub result: TransitionResult,
    pub deduplicated: bool,
}

/// Value-copy projection returned to readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateProjection {
    pub event_count: u64,
    pub state_hash: String,
    pub diagnostics: Diagnostics,
    pub projection: DepartmentView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
    pub roles: BTreeMap<String, Role>,
    pub dependencies: Vec<DependencyEdge>,
    pub transition_results: Vec<TransitionResult>,
}

/// Stream metadata row: last committed sequence and state hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamMetadata {
    last_sequence: u64,
    last_state_hash: String,
}

/// An isolated simulation session with its own event log and state.
pub struct Session {
    project_id: String,
    session_dir: PathBuf,
    engine: OrgEngine,
    store: EventStore,
    snapshot_interval: u64,
    transition_results: Vec<TransitionResult>,
    poisoned: bool,
}

impl Session {
    /// Open (or create) a session, replaying any persisted events.
    ///
    /// Directory layout:
    ///   <base_dir>/<project_id>/events.log
    ///   <base_dir>/<project_id>/metadata.json
    ///   <base_dir>/<project_id>/snapshots/
    pub fn open(
        base_dir: &Path,
        project_id: &str,
        snapshot_interval: u64,
    ) -> Result<Self, RuntimeError> {
        let session_dir = base_dir.join(project_id);
        let store = EventStore::open(&session_dir.join("events.log"))?;

        let mut engine = OrgEngine::new()?;
        let mut transition_results = Vec::new();
        let frames = store.load_all_events()?;
        for frame in &frames {
            let event = wire_to_kernel(frame)?;
            let (_, result) = engine.apply_event(&event)?;
            transition_results.push(result);
        }
        info!(
            project_id,
            replayed = frames.len(),
            hash = engine.state_hash(),
            "session opened"
        );

        Ok(Self {
            project_id: project_id.to_string(),
            session_dir,
            engine,
            store,
            snapshot_interval,
            transition_results,
            poisoned: false,
        })
    }

    /// Apply an event and persist it.
    ///
    /// Assigns the next sequence when the event carries none. A repeated
    /// `event_uuid` is an idempotent no-op returning the current hash.
    pub fn append(&mut self, mut event: EventEnvelope) -> Result<AppendOutcome, RuntimeError> {
        if self.poisoned {
            return Err(RuntimeError::Poisoned {
                project_id: self.project_id.clone(),
            });
        }

        if let Some(event_uuid) = &event.event_uuid {
            if Uuid::parse_str(event_uuid).is_err() {
                return Err(KernelError::BadSchema {
                    field: "event_uuid".to_string(),
                    detail: format!("{event_uuid:?} is not UUID-shaped"),
                }
                .into());
            }
            if let Some(sequence) = self.store.uuid_sequence(event_uuid) {
                debug!(project_id = %self.project_id, %event_uuid, "duplicate append deduplicated");
                return Ok(AppendOutcome {
                    sequence,
                    state_hash: self.engine.state_hash().to_string(),
                    result: self.transition_results[sequence as usize].clone(),
                    deduplicated: true,
                });
            }
        }

        if event.sequence.is_none() {
            event.sequence = Some(self.engine.next_sequence());
        }

        let checkpoint = self.engine.checkpoint();
        let (_, result) = match self.engine.apply_event(&event) {
            Ok(applied) => applied,
            Err(err) => {
                if err.is_fatal() {
                    warn!(project_id = %self.project_id, code = err.code(), "fatal kernel error; session poisoned");
                    self.poisoned = true;
                }
                return Err(err.into());
            }
        };

        // Persist; an I/O failure discards the applied transition.
        if let Err(err) = self.store.append_event(&kernel_to_wire(&event)) {
            self.engine.restore(checkpoint);
            return Err(err);
        }
        let sequence = event.sequence.expect("sequence assigned before apply");
        self.transition_results.push(result.clone());

        self.write_metadata(sequence)?;

        if self.snapshot_interval > 0 && sequence > 0 && sequence % self.snapshot_interval == 0
        {
            // Snapshots are advisory; a failed write never fails the append.
            if let Err(err) = snapshot::save_snapshot(
                &self.session_dir.join("snapshots"),
                sequence,
                self.engine.state(),
            ) {
                warn!(project_id = %self.project_id, code = err.code(), "snapshot write failed");
            }
        }

        debug!(
            project_id = %self.project_id,
            sequence,
            hash = self.engine.state_hash(),
            "event appended"
        );
        Ok(AppendOutcome {
            sequence,
            state_hash: self.engine.state_hash().to_string(),
            result,
            deduplicated: false,
        })
    }

    /// Value-copy projection of the current state.
    pub fn projection(&self, db: Option<&dyn ClassificationSource>) -> StateProjection {
        let state = self.engine.state();
        let drift = db.map(|source| {
            let clusters = cluster_roles(state);
            let labeled = label_clusters(&clusters, source);
            compute_drift(state, &labeled, source)
        });
        StateProjection {
            event_count: state.event_count,
            state_hash: self.engine.state_hash().to_string(),
            diagnostics: compute_diagnostics(state),
            projection: build_view(state, db),
            drift,
            roles: state.roles.clone(),
            dependencies: state.dependencies.clone(),
            transition_results: self.transition_results.clone(),
        }
    }

    /// Replay the log in a fresh kernel and compare against the stored
    /// stream metadata. A mismatch poisons the session; a match clears
    /// any poisoning.
    pub fn verify_determinism(&mut self) -> Result<String, RuntimeError> {
        let frames = self.store.load_all_events()?;
        let events: Vec<EventEnvelope> = frames
            .iter()
            .map(wire_to_kernel)
            .collect::<Result<_, _>>()?;
        let replayed_hash = replay::rebuild_hash(&events)?;

        if let Some(metadata) = self.read_metadata()? {
            if metadata.last_state_hash != replayed_hash {
                self.poisoned = true;
                warn!(project_id = %self.project_id, "determinism verification failed");
                return Err(RuntimeError::Determinism {
                    project_id: self.project_id.clone(),
                    expected: metadata.last_state_hash,
                    actual: replayed_hash,
                });
            }
        }

        self.poisoned = false;
        info!(project_id = %self.project_id, hash = %replayed_hash, "determinism verified");
        Ok(replayed_hash)
    }

    /// Export the full event stream as canonical JSON values.
    pub fn export(&self) -> Result<Vec<serde_json::Value>, RuntimeError> {
        let frames = self.store.load_all_events()?;
        frames
            .iter()
            .map(|f| wire_to_kernel(f).map(|e| e.to_json()))
            .collect()
    }

    /// Import an exported event stream into an empty session.
    ///
    /// Every event is applied and persisted through the normal append
    /// path; the final state hash comes back.
    pub fn import(&mut self, events: &[serde_json::Value]) -> Result<String, RuntimeError> {
        if self.store.last_sequence().is_some() {
            return Err(KernelError::BadSchema {
                field: "session".to_string(),
                detail: "import requires an empty event log".to_string(),
            }
            .into());
        }
        for value in events {
            let event = EventEnvelope::from_json(value)?;
            self.append(event)?;
        }
        Ok(self.engine.state_hash().to_string())
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn state_hash(&self) -> &str {
        self.engine.state_hash()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.store.last_sequence()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn metadata_path(&self) -> PathBuf {
        self.session_dir.join("metadata.json")
    }

    fn write_metadata(&self, last_sequence: u64) -> Result<(), RuntimeError> {
        let metadata = StreamMetadata {
            last_sequence,
            last_state_hash: self.engine.state_hash().to_string(),
        };
        let content = serde_json::to_string(&metadata).map_err(|e| {
            RuntimeError::CorruptLog {
                detail: format!("metadata serialization failed: {e}"),
            }
        })?;
        fs::write(self.metadata_path(), content)?;
        Ok(())
    }

    fn read_metadata(&self) -> Result<Option<StreamMetadata>, RuntimeError> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let metadata = serde_json::from_str(&content).map_err(|e| {
            RuntimeError::CorruptLog {
                detail: format!("bad metadata {}: {e}", path.display()),
            }
        })?;
        Ok(Some(metadata))
    }
}

/// Thread-safe session handle: one writer at a time, readers receive
/// value copies.
pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    pub fn append(&self, event: EventEnvelope) -> Result<AppendOutcome, RuntimeError> {
        self.inner.lock().append(event)
    }

    pub fn projection(&self, db: Option<&dyn ClassificationSource>) -> StateProjection {
        self.inner.lock().projection(db)
    }

    pub fn verify_determinism(&self) -> Result<String, RuntimeError> {
        self.inner.lock().verify_determinism()
    }

    pub fn state_hash(&self) -> String {
        self.inner.lock().state_hash().to_string()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.inner.lock().last_sequence()
    }
}

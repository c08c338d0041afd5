//! Snapshot store — advisory state snapshots.
//!
//! Snapshots contain the canonical state JSON plus its hash so they can
//! be verified independently. They are never injected into replay; the
//! event log alone is authoritative.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use orgsim_kernel::canonical::{canonical_hash, canonical_serialize, hex_digest};
use orgsim_kernel::domain::OrgState;
use orgsim_kernel::KERNEL_VERSION;

use crate::error::RuntimeError;

/// Snapshot on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number at which this snapshot was taken.
    pub sequence: u64,
    /// Canonical JSON of the state (UTF-8).
    pub canonical_json: String,
    /// SHA-256 of the canonical JSON, lowercase hex.
    pub state_hash: String,
    /// Kernel version at snapshot time.
    pub kernel_version: u32,
    /// Unix seconds at write time. Advisory; never hashed.
    pub created_at: u64,
}

/// Save a snapshot of the current state.
pub fn save_snapshot(
    dir: &Path,
    sequence: u64,
    state: &OrgState,
) -> Result<PathBuf, RuntimeError> {
    fs::create_dir_all(dir)?;

    let canonical_bytes = canonical_serialize(state)?;
    let canonical_json = String::from_utf8(canonical_bytes)
        .expect("canonical JSON is always valid UTF-8");
    let state_hash = canonical_hash(state)?;
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let snap = Snapshot {
        sequence,
        canonical_json,
        state_hash,
        kernel_version: KERNEL_VERSION,
        created_at,
    };

    let path = dir.join(snapshot_filename(sequence));
    let content =
        serde_json::to_string(&snap).map_err(|e| RuntimeError::CorruptLog {
            detail: format!("snapshot serialization failed: {e}"),
        })?;

    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    debug!(sequence, path = %path.display(), "snapshot written");

    Ok(path)
}

/// Load a snapshot at a specific sequence number, if present.
pub fn load_snapshot(dir: &Path, sequence: u64) -> Result<Option<Snapshot>, RuntimeError> {
    let path = dir.join(snapshot_filename(sequence));
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let snap: Snapshot =
        serde_json::from_str(&content).map_err(|e| RuntimeError::CorruptLog {
            detail: format!("bad snapshot {}: {e}", path.display()),
        })?;
    Ok(Some(snap))
}

/// Load the snapshot with the highest sequence in a directory.
pub fn load_latest_snapshot(dir: &Path) -> Result<Option<Snapshot>, RuntimeError> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut best_seq: Option<u64> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(seq) = name
            .strip_prefix("snapshot_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            if best_seq.map(|b| seq > b).unwrap_or(true) {
                best_seq = Some(seq);
            }
        }
    }

    match best_seq {
        Some(seq) => load_snapshot(dir, seq),
        None => Ok(None),
    }
}

/// Verify a snapshot's internal hash consistency.
pub fn verify_snapshot_hash(snap: &Snapshot) -> bool {
    hex_digest(snap.canonical_json.as_bytes()) == snap.state_hash
}

fn snapshot_filename(sequence: u64) -> String {
    format!("snapshot_{:06}.json", sequence)
}

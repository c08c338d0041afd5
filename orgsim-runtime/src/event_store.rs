//! Append-only event store — binary protobuf log.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only — no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Sequence strictly contiguous from 0 (validated on append)
//!   - event_uuid index rebuilt on open for idempotency checks

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::RuntimeError;
use crate::wire::{decode_frame, encode_frame, WireEventEnvelope};

/// Frames above this size indicate corruption, not data.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Append-only event log backed by a binary file.
pub struct EventStore {
    path: PathBuf,
    last_sequence: Option<u64>,
    uuid_index: BTreeMap<String, u64>,
}

impl EventStore {
    /// Open or create an event log at the given path.
    ///
    /// Reads existing frames to rebuild the sequence counter and the
    /// uuid index.
    pub fn open(path: &Path) -> Result<Self, RuntimeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut last_sequence = None;
        let mut uuid_index = BTreeMap::new();
        if path.exists() {
            for event in Self::read_all_from_file(path)? {
                last_sequence = Some(event.sequence);
                if !event.event_uuid.is_empty() {
                    uuid_index.insert(event.event_uuid.clone(), event.sequence);
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
            uuid_index,
        })
    }

    /// Append a single event frame, enforcing contiguity, and fsync.
    pub fn append_event(&mut self, event: &WireEventEnvelope) -> Result<(), RuntimeError> {
        let expected = self.last_sequence.map(|s| s + 1).unwrap_or(0);
        if event.sequence != expected {
            return Err(RuntimeError::CorruptLog {
                detail: format!(
                    "append out of order: expected sequence {expected}, got {}",
                    event.sequence
                ),
            });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let buf = encode_frame(event);
        let len = buf.len() as u32;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.last_sequence = Some(event.sequence);
        if !event.event_uuid.is_empty() {
            self.uuid_index
                .insert(event.event_uuid.clone(), event.sequence);
        }
        debug!(sequence = event.sequence, "event frame appended");
        Ok(())
    }

    /// Load all events from the log in sequence order.
    pub fn load_all_events(&self) -> Result<Vec<WireEventEnvelope>, RuntimeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all_from_file(&self.path)
    }

    /// Sequence of the last appended event, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Sequence at which an event_uuid was first appended, if ever.
    pub fn uuid_sequence(&self, event_uuid: &str) -> Option<u64> {
        self.uuid_index.get(event_uuid).copied()
    }

    /// Read all frames, validating frame integrity.
    fn read_all_from_file(path: &Path) -> Result<Vec<WireEventEnvelope>, RuntimeError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut len_buf = [0u8; 4];

        loop {
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                return Err(RuntimeError::CorruptLog {
                    detail: format!("invalid frame length {len}"),
                });
            }

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame).map_err(|e| RuntimeError::CorruptLog {
                detail: format!("truncated frame: {e}"),
            })?;
            events.push(decode_frame(&frame)?);
        }

        Ok(events)
    }
}

//! Binary codec for the `.efx` timeline format
//!
//! A timeline file is a flat sequence of 30-byte records with no header,
//! footer, or checksum. Each record is a u32 little-endian millisecond
//! timestamp followed by a 26-byte opaque effect payload.

use thiserror::Error;

/// Size of the opaque effect payload in each record
pub const PAYLOAD_SIZE: usize = 26;

/// Size of one timeline record: u32 timestamp + payload
pub const RECORD_SIZE: usize = 4 + PAYLOAD_SIZE;

/// Errors that can occur when building timeline entries
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload must be {PAYLOAD_SIZE} bytes, got {0}")]
    PayloadSize(usize),
}

/// One timestamped effect record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfxEntry {
    /// Playback position at which the effect fires
    pub timestamp_ms: u32,
    /// Opaque device payload, passed through unmodified
    pub payload: [u8; PAYLOAD_SIZE],
}

impl EfxEntry {
    pub fn new(timestamp_ms: u32, payload: [u8; PAYLOAD_SIZE]) -> Self {
        Self {
            timestamp_ms,
            payload,
        }
    }

    /// Build an entry from a payload slice, validating its length
    pub fn from_slice(timestamp_ms: u32, payload: &[u8]) -> Result<Self, CodecError> {
        let payload: [u8; PAYLOAD_SIZE] = payload
            .try_into()
            .map_err(|_| CodecError::PayloadSize(payload.len()))?;
        Ok(Self {
            timestamp_ms,
            payload,
        })
    }
}

/// An ordered effect timeline for one music track
///
/// Entries are sorted ascending by timestamp. Loaded wholesale per track
/// and replaced wholesale on track change or reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    entries: Vec<EfxEntry>,
}

impl Timeline {
    /// Build a timeline from entries, sorting them by timestamp
    pub fn new(mut entries: Vec<EfxEntry>) -> Self {
        entries.sort_by_key(|e| e.timestamp_ms);
        Self { entries }
    }

    pub fn entries(&self) -> &[EfxEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry with timestamp <= position_ms, if any
    pub fn index_at(&self, position_ms: u32) -> Option<usize> {
        match self
            .entries
            .partition_point(|e| e.timestamp_ms <= position_ms)
        {
            0 => None,
            n => Some(n - 1),
        }
    }
}

/// Decode a timeline from raw file bytes
///
/// Consumes whole records front to back; a trailing partial record is
/// truncation and is silently dropped.
pub fn decode(data: &[u8]) -> Result<Timeline, CodecError> {
    let mut entries = Vec::with_capacity(data.len() / RECORD_SIZE);
    let mut offset = 0;
    while offset + RECORD_SIZE <= data.len() {
        let timestamp_ms = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&data[offset + 4..offset + RECORD_SIZE]);
        entries.push(EfxEntry::new(timestamp_ms, payload));
        offset += RECORD_SIZE;
    }
    if offset < data.len() {
        tracing::debug!(
            trailing = data.len() - offset,
            "dropping truncated trailing timeline record"
        );
    }
    Ok(Timeline::new(entries))
}

/// Serialize a timeline back to the on-disk record format
///
/// Exact inverse of [`decode`]: decoding the output yields the same
/// timeline byte for byte.
pub fn encode(timeline: &Timeline) -> Vec<u8> {
    let mut out = Vec::with_capacity(timeline.len() * RECORD_SIZE);
    for entry in timeline.entries() {
        out.extend_from_slice(&entry.timestamp_ms.to_le_bytes());
        out.extend_from_slice(&entry.payload);
    }
    out
}

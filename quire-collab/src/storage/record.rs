//! Record codec: operation payloads and the checksummed on-disk envelope.

use quire_ot::Operation;
use serde::{Deserialize, Serialize};

use super::{LogError, LogRecord, RecordMeta};

/// Serialize an operation into a log payload.
pub fn encode_record(op: &Operation) -> Result<Vec<u8>, LogError> {
    bincode::serde::encode_to_vec(op, bincode::config::standard())
        .map_err(|e| LogError::Encode(e.to_string()))
}

/// Deserialize a log payload. The run list is re-normalized on the way in.
pub fn decode_record(payload: &[u8]) -> Result<Operation, LogError> {
    let (op, _): (Operation, _) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| LogError::Decode(e.to_string()))?;
    Ok(op)
}

/// On-disk envelope: metadata, LZ4 payload and checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub meta: RecordMeta,
    /// Uncompressed payload size in bytes
    pub original_size: u32,
    /// LZ4-compressed payload
    pub compressed: Vec<u8>,
    pub checksum: u32,
}

impl StoredRecord {
    pub(crate) fn seal(meta: RecordMeta, payload: &[u8]) -> Result<Self, LogError> {
        let original_size = payload_size(payload.len())?;
        Ok(Self {
            meta,
            original_size,
            compressed: lz4_flex::compress_prepend_size(payload),
            checksum: checksum(&meta, payload),
        })
    }

    /// Decompress and verify. `index` is the key the envelope was stored under.
    pub(crate) fn open(self, index: u64) -> Result<LogRecord, LogError> {
        let payload = lz4_flex::decompress_size_prepended(&self.compressed).map_err(|e| {
            LogError::Corrupt {
                index,
                reason: format!("decompression failed: {e}"),
            }
        })?;
        if payload.len() != self.original_size as usize {
            return Err(LogError::Corrupt {
                index,
                reason: format!(
                    "size {} does not match recorded {}",
                    payload.len(),
                    self.original_size
                ),
            });
        }
        if self.meta.index != index || checksum(&self.meta, &payload) != self.checksum {
            return Err(LogError::Corrupt {
                index,
                reason: "checksum mismatch".into(),
            });
        }
        Ok(LogRecord {
            meta: self.meta,
            payload,
        })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, LogError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| LogError::Encode(e.to_string()))
    }

    pub(crate) fn decode(index: u64, bytes: &[u8]) -> Result<Self, LogError> {
        let (record, _): (Self, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| {
                LogError::Corrupt {
                    index,
                    reason: e.to_string(),
                }
            })?;
        Ok(record)
    }
}

/// Envelope size field for a payload of `len` bytes.
fn payload_size(len: usize) -> Result<u32, LogError> {
    u32::try_from(len)
        .map_err(|_| LogError::Encode(format!("payload of {len} bytes exceeds u32::MAX")))
}

/// FNV-1a style fold over metadata and payload words.
fn checksum(meta: &RecordMeta, payload: &[u8]) -> u32 {
    const PRIME: u32 = 0x0100_0193;
    let mut hash: u32 = 0x811c_9dc5;
    let mut mix = |word: u32| {
        hash ^= word;
        hash = hash.wrapping_mul(PRIME);
    };

    mix(meta.index as u32);
    mix((meta.index >> 32) as u32);
    for byte in meta.author.as_bytes() {
        mix(*byte as u32);
    }
    match meta.base {
        Some(base) => {
            mix(1);
            mix(base as u32);
            mix((base >> 32) as u32);
        }
        None => mix(0),
    }
    mix(meta.timestamp as u32);
    for chunk in payload.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        mix(u32::from_le_bytes(word));
    }
    hash
}

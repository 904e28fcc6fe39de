//! Fixed-layout wire contract between adjacent workers.
//!
//! All integers are little-endian. A handoff frame is an `i32` record
//! count followed by that many 20-byte records; a statistics frame is one
//! 24-byte record. Anything that does not decode exactly is a hard fault:
//! the channels are reliable and in-order, so a malformed frame means the
//! peers disagree about the protocol and the run must stop.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A malformed inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    NegativeCount(i32),
    FrameSizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::NegativeCount(count) => {
                write!(f, "handoff frame carries negative record count {count}")
            }
            WireError::FrameSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "handoff frame is {actual} bytes, expected {expected}"
                )
            }
        }
    }
}

impl std::error::Error for WireError {}

/// One vehicle crossing a segment boundary: just enough state to
/// reconstruct it on the receiving worker.
///
/// `position` is the entry cell in the receiver's local coordinates;
/// `ticks_on_segment` is the transit time measured on the sending segment
/// (the receiver restarts its own count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub lane: i32,
    pub id: i32,
    pub position: i32,
    pub speed: i32,
    pub ticks_on_segment: i32,
}

impl HandoffRecord {
    pub const WIRE_SIZE: usize = 20;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut bytes = [0u8; Self::WIRE_SIZE];
        bytes[0..4].copy_from_slice(&self.lane.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.id.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.position.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.speed.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.ticks_on_segment.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        let field = |range: std::ops::Range<usize>| {
            i32::from_le_bytes(bytes[range].try_into().expect("4-byte field"))
        };
        Self {
            lane: field(0..4),
            id: field(4..8),
            position: field(8..12),
            speed: field(12..16),
            ticks_on_segment: field(16..20),
        }
    }
}

/// Encode a handoff batch: count, then the records.
pub fn encode_batch(records: &[HandoffRecord]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + records.len() * HandoffRecord::WIRE_SIZE);
    frame.extend_from_slice(&(records.len() as i32).to_le_bytes());
    for record in records {
        frame.extend_from_slice(&record.to_bytes());
    }
    frame
}

/// Decode a handoff batch, rejecting frames whose length does not match
/// the advertised count exactly.
pub fn decode_batch(frame: &[u8]) -> Result<Vec<HandoffRecord>, WireError> {
    if frame.len() < 4 {
        return Err(WireError::FrameSizeMismatch {
            expected: 4,
            actual: frame.len(),
        });
    }
    let count = i32::from_le_bytes(frame[0..4].try_into().expect("4-byte count"));
    if count < 0 {
        return Err(WireError::NegativeCount(count));
    }
    let expected = 4 + count as usize * HandoffRecord::WIRE_SIZE;
    if frame.len() != expected {
        return Err(WireError::FrameSizeMismatch {
            expected,
            actual: frame.len(),
        });
    }

    let mut records = Vec::with_capacity(count as usize);
    for chunk in frame[4..].chunks_exact(HandoffRecord::WIRE_SIZE) {
        let bytes: &[u8; HandoffRecord::WIRE_SIZE] =
            chunk.try_into().expect("exact-size chunk");
        records.push(HandoffRecord::from_bytes(bytes));
    }
    Ok(records)
}

/// One worker's local travel-time accumulator, flattened for the
/// statistics gather. `count` rides as a double so the record is three
/// homogeneous fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub mean: f64,
    pub variance: f64,
    pub count: f64,
}

impl StatRecord {
    pub const WIRE_SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut bytes = [0u8; Self::WIRE_SIZE];
        bytes[0..8].copy_from_slice(&self.mean.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.variance.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        let field = |range: std::ops::Range<usize>| {
            f64::from_le_bytes(bytes[range].try_into().expect("8-byte field"))
        };
        Self {
            mean: field(0..8),
            variance: field(8..16),
            count: field(16..24),
        }
    }
}

/// Short identifier for a run, derived from the canonical JSON encoding
/// of its configuration.
pub fn run_fingerprint(canonical_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    hex[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_record_layout_is_twenty_le_bytes() {
        let record = HandoffRecord {
            lane: 1,
            id: 258,
            position: 3,
            speed: 4,
            ticks_on_segment: 5,
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 20);
        assert_eq!(
            bytes,
            [
                1, 0, 0, 0, //
                2, 1, 0, 0, // 258 = 0x0102
                3, 0, 0, 0, //
                4, 0, 0, 0, //
                5, 0, 0, 0,
            ]
        );
        assert_eq!(HandoffRecord::from_bytes(&bytes), record);
    }

    #[test]
    fn stat_record_layout_is_twenty_four_bytes() {
        let record = StatRecord {
            mean: 12.5,
            variance: 3.25,
            count: 40.0,
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[0..8], 12.5f64.to_le_bytes());
        assert_eq!(StatRecord::from_bytes(&bytes), record);
    }

    #[test]
    fn batch_roundtrip_preserves_order() {
        let records = vec![
            HandoffRecord {
                lane: 0,
                id: 10,
                position: 1,
                speed: 2,
                ticks_on_segment: 7,
            },
            HandoffRecord {
                lane: 1,
                id: 11,
                position: 0,
                speed: 5,
                ticks_on_segment: 3,
            },
        ];
        let frame = encode_batch(&records);
        assert_eq!(frame.len(), 4 + 2 * HandoffRecord::WIRE_SIZE);
        assert_eq!(decode_batch(&frame).expect("decode"), records);
    }

    #[test]
    fn empty_batch_is_just_the_count() {
        let frame = encode_batch(&[]);
        assert_eq!(frame, vec![0, 0, 0, 0]);
        assert!(decode_batch(&frame).expect("decode").is_empty());
    }

    #[test]
    fn truncated_frame_is_a_hard_fault() {
        let mut frame = encode_batch(&[HandoffRecord {
            lane: 0,
            id: 1,
            position: 2,
            speed: 3,
            ticks_on_segment: 4,
        }]);
        frame.truncate(frame.len() - 1);
        let err = decode_batch(&frame).expect_err("truncated");
        assert_eq!(
            err,
            WireError::FrameSizeMismatch {
                expected: 24,
                actual: 23
            }
        );
    }

    #[test]
    fn negative_count_is_a_hard_fault() {
        let frame = (-1i32).to_le_bytes().to_vec();
        assert_eq!(
            decode_batch(&frame).expect_err("negative"),
            WireError::NegativeCount(-1)
        );
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let first = run_fingerprint("{\"road_length\":1000}");
        let second = run_fingerprint("{\"road_length\":1000}");
        let other = run_fingerprint("{\"road_length\":1001}");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 12);
    }
}

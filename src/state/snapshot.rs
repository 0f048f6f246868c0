//! Immutable disposition snapshots and the little-endian vector wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{AdcError, Result};
use crate::state::segment::{SegmentId, SegmentMap};

/// One versioned, immutable instance of the disposition state.
///
/// A snapshot never changes after it is written to the store. The chain is a
/// strict tree: every non-initial snapshot names exactly one parent, and the
/// single active pointer can reference any snapshot independently of the
/// chain topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Opaque unique identifier for this snapshot.
    pub version_id: String,
    /// Parent snapshot identifier; absent only on the initial snapshot.
    pub parent_id: Option<String>,
    /// The full disposition vector.
    pub vector: Vec<f32>,
    /// Segment layout in force when this snapshot was written.
    pub segment_map: SegmentMap,
    /// Creation time, UTC, nanosecond resolution.
    pub created_at: DateTime<Utc>,
    /// Optional free-form metrics blob recorded by the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}

impl StateSnapshot {
    /// Build the zero-vector initial snapshot for a layout.
    #[must_use]
    pub fn initial(version_id: String, segment_map: SegmentMap, created_at: DateTime<Utc>) -> Self {
        let dim = segment_map.dim();
        Self {
            version_id,
            parent_id: None,
            vector: vec![0.0; dim],
            segment_map,
            created_at,
            metrics: None,
        }
    }

    /// Slice of the vector covered by a segment.
    ///
    /// Returns an empty slice when the segment is absent from this layout.
    #[must_use]
    pub fn segment(&self, id: SegmentId) -> &[f32] {
        self.segment_map
            .range(id)
            .map_or(&[][..], |range| &self.vector[range])
    }

    /// L2 norm of the full vector (f64 accumulation).
    #[must_use]
    pub fn l2_norm(&self) -> f64 {
        l2_norm(&self.vector)
    }

    /// L2 norm of one segment (f64 accumulation).
    #[must_use]
    pub fn segment_norm(&self, id: SegmentId) -> f64 {
        l2_norm(self.segment(id))
    }

    /// Whether every element of the vector is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.vector.iter().all(|v| *v == 0.0)
    }
}

/// L2 norm with a 64-bit accumulator over 32-bit elements.
#[must_use]
pub fn l2_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|v| {
            let v = f64::from(*v);
            v * v
        })
        .sum::<f64>()
        .sqrt()
}

/// Encode a vector as a fixed-length little-endian f32 byte sequence.
#[must_use]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode a little-endian f32 byte sequence, enforcing the expected width.
pub fn decode_vector(blob: &[u8], expected_dim: usize) -> Result<Vec<f32>> {
    if blob.len() != expected_dim * 4 {
        return Err(AdcError::store(
            "decode_vector",
            format!(
                "state blob is {} bytes, expected {} for {expected_dim} floats",
                blob.len(),
                expected_dim * 4
            ),
        ));
    }
    let mut out = Vec::with_capacity(expected_dim);
    for chunk in blob.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}

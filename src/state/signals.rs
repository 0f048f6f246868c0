//! Per-turn signal bundles and the metrics produced by the update function.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::segment::SegmentId;

/// Signals observed for one interaction turn.
///
/// The three scalar signals are expected in `[0, 1]`; the four flags are hard
/// veto triggers for the gate. `direction_vectors` optionally overrides the
/// sign-based delta direction for a segment and is treated as pre-normalised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signals {
    /// Sentiment of the interaction, reinforces `prefs`.
    pub sentiment_score: f32,
    /// Coherence of the response, reinforces `goals`.
    pub coherence_score: f32,
    /// Novelty of the response, reinforces `heuristics`.
    pub novelty_score: f32,
    /// Hard flag: safety risk observed.
    pub risk_flag: bool,
    /// Hard flag: the user corrected the assistant.
    pub user_correction: bool,
    /// Hard flag: a tool invocation failed.
    pub tool_failure: bool,
    /// Hard flag: an operating constraint was violated.
    pub constraint_violation: bool,
    /// Optional per-segment unit-norm delta directions.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub direction_vectors: BTreeMap<SegmentId, Vec<f32>>,
}

impl Signals {
    /// Whether any hard veto flag is set.
    #[must_use]
    pub const fn has_hard_flag(&self) -> bool {
        self.risk_flag || self.user_correction || self.tool_failure || self.constraint_violation
    }

    /// Signal strength driving a segment's delta pass.
    ///
    /// The risk segment is driven by generation entropy (clamped to `[0, 1]`
    /// by the caller); there is no independent risk-strength input.
    #[must_use]
    pub fn strength_for(&self, segment: SegmentId, clamped_entropy: f32) -> f32 {
        match segment {
            SegmentId::Prefs => self.sentiment_score,
            SegmentId::Goals => self.coherence_score,
            SegmentId::Heuristics => self.novelty_score,
            SegmentId::Risk => clamped_entropy,
        }
    }
}

/// Per-segment row of the update metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    /// Segment the row describes.
    pub segment: SegmentId,
    /// Final (clamped) L2 norm of the applied delta.
    pub delta_norm: f64,
    /// L2 norm of the amount removed by the decay pass.
    pub decay_norm: f64,
}

/// Metrics describing one update proposal.
///
/// `segments_hit` lists only segments that received a non-zero delta; a
/// segment changed by decay alone shows up in `per_segment` with a positive
/// `decay_norm` but is not counted as hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMetrics {
    /// L2 norm of the difference between the proposed and current vectors.
    pub total_delta_norm: f64,
    /// Segments that received a non-zero delta, in processing order.
    pub segments_hit: Vec<SegmentId>,
    /// Per-segment delta and decay norms, in processing order.
    pub per_segment: Vec<SegmentMetrics>,
}

impl UpdateMetrics {
    /// Serialize for the snapshot metrics blob and provenance rows.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

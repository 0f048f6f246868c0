//! Post-commit validation of the newly active snapshot.
//!
//! The evaluator is side-effect-free: it reports pass/fail and the caller
//! decides whether to roll the active pointer back to the parent.

use serde::{Deserialize, Serialize};

use crate::core::config::EvalConfig;
use crate::state::segment::SegmentId;
use crate::state::snapshot::StateSnapshot;

/// Norm measurements and verdict for one committed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalOutcome {
    /// Whether every blocking check passed.
    pub passed: bool,
    /// First failing check plus failure count, or the pass summary.
    pub reason: String,
    /// Full-vector L2 norm.
    pub state_norm: f64,
    /// Per-segment L2 norms in layout order.
    pub segment_norms: Vec<(SegmentId, f64)>,
    /// Entropy of the generation that produced this snapshot.
    pub entropy: f32,
    /// Informational: whether entropy is within the configured baseline.
    pub entropy_within_baseline: bool,
    /// Number of blocking checks that failed.
    pub failed_checks: usize,
}

/// Check the committed snapshot against the norm bounds.
///
/// The entropy-baseline comparison is reported but never blocks.
#[must_use]
pub fn evaluate_state(snapshot: &StateSnapshot, entropy: f32, config: &EvalConfig) -> EvalOutcome {
    let state_norm = snapshot.l2_norm();
    let segment_norms: Vec<(SegmentId, f64)> = snapshot
        .segment_map
        .iter()
        .map(|span| (span.id, snapshot.segment_norm(span.id)))
        .collect();

    let mut failures: Vec<String> = Vec::new();
    let max_state = f64::from(config.max_state_norm);
    if state_norm > max_state {
        failures.push(format!(
            "state norm {state_norm:.4} exceeds max {max_state:.4}"
        ));
    }
    let max_segment = f64::from(config.max_segment_norm);
    for (segment, norm) in &segment_norms {
        if *norm > max_segment {
            failures.push(format!(
                "segment {segment} norm {norm:.4} exceeds max {max_segment:.4}"
            ));
        }
    }

    let entropy_within_baseline = entropy <= config.entropy_baseline;
    let failed_checks = failures.len();
    let passed = failed_checks == 0;
    let reason = if passed {
        format!(
            "all checks passed: state norm {state_norm:.4}, entropy {entropy:.3} ({})",
            if entropy_within_baseline {
                "within baseline"
            } else {
                "above baseline, informational"
            }
        )
    } else {
        format!(
            "{} ({failed_checks} check{} failed)",
            failures[0],
            if failed_checks == 1 { "" } else { "s" }
        )
    };

    EvalOutcome {
        passed,
        reason,
        state_norm,
        segment_norms,
        entropy,
        entropy_within_baseline,
        failed_checks,
    }
}

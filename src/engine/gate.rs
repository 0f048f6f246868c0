//! Hard-veto gate over update proposals, with soft scoring for survivors.
//!
//! Hard vetoes short-circuit in a fixed order; the reason string always cites
//! the first veto while `veto_signals` lists every veto that fired. The soft
//! score never blocks here, it only feeds logging and ranking.

use serde::{Deserialize, Serialize};

use crate::core::config::GateConfig;
use crate::engine::update::l2_distance;
use crate::state::segment::SegmentId;
use crate::state::signals::{Signals, UpdateMetrics};
use crate::state::snapshot::StateSnapshot;

/// Gate verdict on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    /// The proposal may be committed.
    Commit,
    /// The proposal is rejected; the store stays on the current snapshot.
    Reject,
}

/// Category of a hard veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoCategory {
    /// Risk flag set or risk-segment norm above cap.
    SafetyViolation,
    /// The user corrected the assistant this turn.
    UserCorrection,
    /// A tool invocation failed this turn.
    ToolFailure,
    /// Constraint flag set or delta norm above cap.
    ConstraintViolation,
}

impl VetoCategory {
    /// Stable wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SafetyViolation => "safety_violation",
            Self::UserCorrection => "user_correction",
            Self::ToolFailure => "tool_failure",
            Self::ConstraintViolation => "constraint_violation",
        }
    }
}

/// One fired veto with its human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoSignal {
    /// Veto category.
    pub category: VetoCategory,
    /// What specifically tripped it.
    pub detail: String,
}

/// Full gate output for one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Commit or reject.
    pub action: GateAction,
    /// Reason string citing the first veto, or the acceptance summary.
    pub reason: String,
    /// Whether any hard veto fired.
    pub vetoed: bool,
    /// Every veto that fired, in check order.
    pub veto_signals: Vec<VetoSignal>,
    /// Soft score in `[0, 1]`; zero when vetoed.
    pub soft_score: f64,
}

/// Run the hard-veto cascade and, for survivors, compute the soft score.
///
/// The soft score's entropy component uses the post-generation entropy as a
/// proxy for entropy drop; `GateConfig::min_entropy_drop` is a reserved knob
/// and does not yet participate.
#[must_use]
pub fn evaluate_gate(
    current: &StateSnapshot,
    proposed: &StateSnapshot,
    signals: &Signals,
    entropy: f32,
    metrics: &UpdateMetrics,
    config: &GateConfig,
) -> GateDecision {
    let mut vetoes = Vec::new();

    if signals.risk_flag {
        vetoes.push(VetoSignal {
            category: VetoCategory::SafetyViolation,
            detail: "risk flag set".to_string(),
        });
    }
    if signals.user_correction {
        vetoes.push(VetoSignal {
            category: VetoCategory::UserCorrection,
            detail: "user correction observed".to_string(),
        });
    }
    if signals.tool_failure {
        vetoes.push(VetoSignal {
            category: VetoCategory::ToolFailure,
            detail: "tool failure observed".to_string(),
        });
    }
    if signals.constraint_violation {
        vetoes.push(VetoSignal {
            category: VetoCategory::ConstraintViolation,
            detail: "constraint violation observed".to_string(),
        });
    }

    let delta_norm = l2_distance(&proposed.vector, &current.vector);
    let max_delta = f64::from(config.max_delta_norm);
    if delta_norm > max_delta {
        vetoes.push(VetoSignal {
            category: VetoCategory::ConstraintViolation,
            detail: format!("delta norm {delta_norm:.4} exceeds max {max_delta:.4}"),
        });
    }

    let risk_norm = proposed.segment_norm(SegmentId::Risk);
    let risk_cap = f64::from(config.risk_segment_cap);
    if risk_norm > risk_cap {
        vetoes.push(VetoSignal {
            category: VetoCategory::SafetyViolation,
            detail: format!("risk segment norm {risk_norm:.4} exceeds cap {risk_cap:.4}"),
        });
    }

    if let Some(first) = vetoes.first() {
        return GateDecision {
            action: GateAction::Reject,
            reason: format!("vetoed ({}): {}", first.category.name(), first.detail),
            vetoed: true,
            veto_signals: vetoes,
            soft_score: 0.0,
        };
    }

    let soft_score = soft_score(current, entropy, metrics);
    GateDecision {
        action: GateAction::Commit,
        reason: format!(
            "accepted: entropy {entropy:.3}, delta norm {:.4}, soft score {soft_score:.3}",
            metrics.total_delta_norm
        ),
        vetoed: false,
        veto_signals: Vec::new(),
        soft_score,
    }
}

/// Weighted soft score over entropy, delta stability, and focus.
fn soft_score(current: &StateSnapshot, entropy: f32, metrics: &UpdateMetrics) -> f64 {
    let mut score = 0.0f64;

    // Entropy component (0.4): low post-generation entropy reads as a
    // confident turn; a zero prior vector has no baseline so score neutral.
    if current.is_zero() {
        score += 0.2;
    } else if entropy < 1.0 {
        score += 0.4 * (1.0 - f64::from(entropy));
    }

    // Delta stability (0.3): small proposals are safer than large ones.
    let delta = metrics.total_delta_norm;
    if delta == 0.0 {
        score += 0.3;
    } else if delta < 1.0 {
        score += 0.3 * (1.0 - delta);
    }

    // Focus (0.3): the fewer segments touched, the more targeted the turn.
    score += match metrics.segments_hit.len() {
        0 => 0.3,
        1 => 0.2,
        2 => 0.1,
        _ => 0.0,
    };

    score.clamp(0.0, 1.0)
}

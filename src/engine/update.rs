//! Pure disposition update: per-segment decay plus bounded signal-driven delta.
//!
//! The function is deterministic and performs no I/O. Version identity and
//! timestamp for the proposed snapshot are injected by the caller so replay
//! can reproduce runs bit-for-bit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::UpdateConfig;
use crate::state::segment::SegmentId;
use crate::state::signals::{SegmentMetrics, Signals, UpdateMetrics};
use crate::state::snapshot::{StateSnapshot, l2_norm};

/// Decision produced by the update function itself.
///
/// `Commit` here means "propose for the gate"; acceptance is the gate's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    /// The proposal is byte-identical to the current state.
    NoOp,
    /// The proposal differs and should be gated.
    Commit,
}

/// Identity injected into the proposed snapshot by the caller.
#[derive(Debug, Clone)]
pub struct ProposalIdentity {
    /// Fresh version id for the proposal.
    pub version_id: String,
    /// Creation timestamp for the proposal.
    pub created_at: DateTime<Utc>,
}

/// Output of one update call.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The proposed next snapshot (parent set to the input snapshot).
    pub proposed: StateSnapshot,
    /// Whether the proposal changes anything.
    pub action: UpdateAction,
    /// Delta/decay accounting for the proposal.
    pub metrics: UpdateMetrics,
}

/// Apply one turn's signals to the current snapshot.
///
/// Segments are processed in the fixed order `prefs`, `goals`, `heuristics`,
/// `risk`. A segment whose signal is positive is reinforced: it skips decay
/// and receives a bounded delta. An unreinforced segment decays by
/// `1 - decay_rate`. The risk segment's signal strength is the generation
/// entropy clamped to `[0, 1]`; decoupling it from entropy is a candidate
/// future change.
#[must_use]
pub fn apply_update(
    current: &StateSnapshot,
    signals: &Signals,
    entropy: f32,
    config: &UpdateConfig,
    identity: ProposalIdentity,
) -> UpdateOutcome {
    let clamped_entropy = entropy.clamp(0.0, 1.0);
    let mut next = current.vector.clone();
    let mut segments_hit = Vec::new();
    let mut per_segment = Vec::with_capacity(SegmentId::ALL.len());

    for segment in SegmentId::ALL {
        let Some(range) = current.segment_map.range(segment) else {
            continue;
        };
        let strength = signals.strength_for(segment, clamped_entropy);
        let reinforced = strength > 0.0;

        let mut decay_norm = 0.0f64;
        if !reinforced && config.decay_rate > 0.0 {
            let keep = 1.0 - config.decay_rate;
            for value in &mut next[range.clone()] {
                let old = *value;
                *value = old * keep;
                let removed = f64::from(old - *value);
                decay_norm += removed * removed;
            }
            decay_norm = decay_norm.sqrt();
        }

        let mut delta_norm = 0.0f64;
        if strength > 0.0 && config.learning_rate > 0.0 {
            let width = range.len();
            let scale = config.learning_rate * strength;
            let mut raw: Vec<f32> = match signals.direction_vectors.get(&segment) {
                Some(direction) if direction.len() == width => {
                    direction.iter().map(|d| d * scale).collect()
                }
                _ => next[range.clone()]
                    .iter()
                    .map(|v| if *v < 0.0 { -scale } else { scale })
                    .collect(),
            };
            let raw_norm = l2_norm(&raw);
            let cap = f64::from(config.max_delta_norm_per_segment);
            if raw_norm > cap && raw_norm > 0.0 {
                let shrink = (cap / raw_norm) as f32;
                for value in &mut raw {
                    *value *= shrink;
                }
            }
            for (value, delta) in next[range].iter_mut().zip(&raw) {
                *value += delta;
            }
            delta_norm = l2_norm(&raw);
            if delta_norm > 0.0 {
                segments_hit.push(segment);
            }
        }

        per_segment.push(SegmentMetrics {
            segment,
            delta_norm,
            decay_norm,
        });
    }

    if config.max_state_norm > 0.0 {
        let norm = l2_norm(&next);
        let cap = f64::from(config.max_state_norm);
        if norm > cap {
            let shrink = (cap / norm) as f32;
            for value in &mut next {
                *value *= shrink;
            }
        }
    }

    let total_delta_norm = l2_distance(&next, &current.vector);
    let action = if total_delta_norm == 0.0 {
        UpdateAction::NoOp
    } else {
        UpdateAction::Commit
    };

    let metrics = UpdateMetrics {
        total_delta_norm,
        segments_hit,
        per_segment,
    };

    let proposed = StateSnapshot {
        version_id: identity.version_id,
        parent_id: Some(current.version_id.clone()),
        vector: next,
        segment_map: current.segment_map.clone(),
        created_at: identity.created_at,
        metrics: Some(metrics.to_json_value()),
    };

    UpdateOutcome {
        proposed,
        action,
        metrics,
    }
}

/// L2 norm of the elementwise difference of two equal-length vectors.
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::segment::SegmentMap;

    fn ident(tag: &str) -> ProposalIdentity {
        ProposalIdentity {
            version_id: tag.to_string(),
            created_at: DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn zero_state() -> StateSnapshot {
        StateSnapshot::initial(
            "v0".into(),
            SegmentMap::default_layout(),
            ident("v0").created_at,
        )
    }

    fn seeded_state(value: f32) -> StateSnapshot {
        let mut snap = zero_state();
        let range = snap.segment_map.range(SegmentId::Prefs).unwrap();
        for v in &mut snap.vector[range] {
            *v = value;
        }
        snap
    }

    #[test]
    fn all_zero_signals_on_zero_state_is_no_op() {
        let state = zero_state();
        let out = apply_update(
            &state,
            &Signals::default(),
            0.0,
            &UpdateConfig::default(),
            ident("v1"),
        );
        assert_eq!(out.action, UpdateAction::NoOp);
        assert_eq!(out.proposed.vector, state.vector);
        assert!(out.metrics.total_delta_norm.abs() < f64::EPSILON);
        assert!(out.metrics.segments_hit.is_empty());
    }

    #[test]
    fn positive_sentiment_grows_seeded_prefs() {
        let state = seeded_state(0.1);
        let signals = Signals {
            sentiment_score: 0.8,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 0.0, &UpdateConfig::default(), ident("v1"));
        assert_eq!(out.action, UpdateAction::Commit);
        for value in out.proposed.segment(SegmentId::Prefs) {
            assert!(*value > 0.1, "prefs element {value} should grow");
        }
        assert_eq!(
            out.proposed.segment(SegmentId::Goals),
            state.segment(SegmentId::Goals)
        );
        assert_eq!(
            out.proposed.segment(SegmentId::Heuristics),
            state.segment(SegmentId::Heuristics)
        );
        assert_eq!(
            out.proposed.segment(SegmentId::Risk),
            state.segment(SegmentId::Risk)
        );
        assert_eq!(out.metrics.segments_hit, vec![SegmentId::Prefs]);
    }

    #[test]
    fn entropy_drives_risk_segment_delta() {
        let state = zero_state();
        let out = apply_update(
            &state,
            &Signals::default(),
            0.5,
            &UpdateConfig::default(),
            ident("v1"),
        );
        assert_eq!(out.action, UpdateAction::Commit);
        assert_eq!(out.metrics.segments_hit, vec![SegmentId::Risk]);
        for value in out.proposed.segment(SegmentId::Risk) {
            assert!((*value - 0.005).abs() < 1e-6);
        }
    }

    #[test]
    fn entropy_above_one_is_clamped() {
        let state = zero_state();
        let high = apply_update(
            &state,
            &Signals::default(),
            7.5,
            &UpdateConfig::default(),
            ident("v1"),
        );
        let unit = apply_update(
            &state,
            &Signals::default(),
            1.0,
            &UpdateConfig::default(),
            ident("v1"),
        );
        assert_eq!(high.proposed.vector, unit.proposed.vector);
    }

    #[test]
    fn unreinforced_segments_decay_exactly() {
        let mut state = zero_state();
        for v in &mut state.vector {
            *v = 0.5;
        }
        let config = UpdateConfig::default();
        let out = apply_update(&state, &Signals::default(), 0.0, &config, ident("v1"));
        let expected = 0.5f32 * (1.0 - config.decay_rate);
        for value in &out.proposed.vector {
            assert_eq!(value.to_bits(), expected.to_bits());
        }
        assert!(out.metrics.segments_hit.is_empty());
        for row in &out.metrics.per_segment {
            assert!(row.decay_norm > 0.0);
            assert!(row.delta_norm.abs() < f64::EPSILON);
        }
    }

    #[test]
    fn reinforced_segment_skips_decay() {
        let state = seeded_state(0.5);
        let config = UpdateConfig {
            learning_rate: 0.0,
            ..UpdateConfig::default()
        };
        let signals = Signals {
            sentiment_score: 0.9,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 0.0, &config, ident("v1"));
        // learning_rate is zero so no delta either; prefs must be untouched.
        assert_eq!(
            out.proposed.segment(SegmentId::Prefs),
            state.segment(SegmentId::Prefs)
        );
        let prefs_row = &out.metrics.per_segment[0];
        assert!(prefs_row.decay_norm.abs() < f64::EPSILON);
    }

    #[test]
    fn sign_is_preserved_without_direction_vector() {
        let mut state = zero_state();
        let range = state.segment_map.range(SegmentId::Prefs).unwrap();
        state.vector[range.start] = 0.3;
        state.vector[range.start + 1] = -0.3;
        state.vector[range.start + 2] = 0.0;
        let signals = Signals {
            sentiment_score: 0.5,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 0.0, &UpdateConfig::default(), ident("v1"));
        let prefs = out.proposed.segment(SegmentId::Prefs);
        assert!(prefs[0] > 0.3, "positive element grows positive");
        assert!(prefs[1] < -0.3, "negative element grows negative");
        assert!(prefs[2] > 0.0, "zero element gains a positive delta");
    }

    #[test]
    fn direction_vector_overrides_sign_fallback() {
        let state = seeded_state(0.2);
        let mut direction = vec![0.0f32; 32];
        direction[0] = -1.0;
        let mut signals = Signals {
            sentiment_score: 1.0,
            ..Signals::default()
        };
        signals
            .direction_vectors
            .insert(SegmentId::Prefs, direction);
        let out = apply_update(&state, &signals, 0.0, &UpdateConfig::default(), ident("v1"));
        let prefs = out.proposed.segment(SegmentId::Prefs);
        assert!(prefs[0] < 0.2, "directed element moves against its sign");
        assert!((prefs[1] - 0.2).abs() < f32::EPSILON, "undirected element untouched");
    }

    #[test]
    fn wrong_width_direction_vector_falls_back_to_signs() {
        let state = seeded_state(0.2);
        let mut signals = Signals {
            sentiment_score: 1.0,
            ..Signals::default()
        };
        signals
            .direction_vectors
            .insert(SegmentId::Prefs, vec![-1.0; 4]);
        let out = apply_update(&state, &signals, 0.0, &UpdateConfig::default(), ident("v1"));
        for value in out.proposed.segment(SegmentId::Prefs) {
            assert!(*value > 0.2, "fallback direction follows existing sign");
        }
    }

    #[test]
    fn per_segment_delta_norm_is_capped() {
        let state = seeded_state(1.0);
        let config = UpdateConfig {
            learning_rate: 10.0,
            max_delta_norm_per_segment: 1.0,
            max_state_norm: 0.0,
            ..UpdateConfig::default()
        };
        let signals = Signals {
            sentiment_score: 1.0,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 0.0, &config, ident("v1"));
        let prefs_row = &out.metrics.per_segment[0];
        assert!(
            prefs_row.delta_norm <= 1.0 + 1e-6,
            "delta norm {} exceeds cap",
            prefs_row.delta_norm
        );
    }

    #[test]
    fn state_norm_is_capped_when_configured() {
        let mut state = zero_state();
        for v in &mut state.vector {
            *v = 1.0;
        }
        let config = UpdateConfig {
            max_state_norm: 3.0,
            ..UpdateConfig::default()
        };
        let signals = Signals {
            sentiment_score: 1.0,
            coherence_score: 1.0,
            novelty_score: 1.0,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 1.0, &config, ident("v1"));
        assert!(out.proposed.l2_norm() <= 3.0 + 1e-6);
        for value in &out.proposed.vector {
            assert!(*value >= 0.0, "rescale preserves signs");
        }
    }

    #[test]
    fn zero_max_state_norm_disables_rescale() {
        let mut state = zero_state();
        for v in &mut state.vector {
            *v = 10.0;
        }
        let config = UpdateConfig {
            max_state_norm: 0.0,
            ..UpdateConfig::default()
        };
        let signals = Signals {
            sentiment_score: 1.0,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 0.0, &config, ident("v1"));
        assert!(out.proposed.l2_norm() > 100.0);
    }

    #[test]
    fn update_is_deterministic() {
        let state = seeded_state(0.37);
        let signals = Signals {
            sentiment_score: 0.61,
            coherence_score: 0.13,
            novelty_score: 0.99,
            ..Signals::default()
        };
        let a = apply_update(&state, &signals, 0.42, &UpdateConfig::default(), ident("v1"));
        let b = apply_update(&state, &signals, 0.42, &UpdateConfig::default(), ident("v1"));
        for (x, y) in a.proposed.vector.iter().zip(&b.proposed.vector) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
        assert_eq!(a.action, b.action);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn proposal_links_parent_and_carries_metrics() {
        let state = seeded_state(0.1);
        let signals = Signals {
            sentiment_score: 0.8,
            ..Signals::default()
        };
        let out = apply_update(&state, &signals, 0.0, &UpdateConfig::default(), ident("v1"));
        assert_eq!(out.proposed.parent_id.as_deref(), Some("v0"));
        assert_eq!(out.proposed.version_id, "v1");
        let metrics = out.proposed.metrics.as_ref().unwrap();
        assert_eq!(metrics["segments_hit"][0], "prefs");
    }
}

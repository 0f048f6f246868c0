//! Property pack for the pure engine: determinism, bounded deltas, decay
//! exactness, sign preservation, soft-score range, and wire round-trips.

use proptest::prelude::*;

use adaptive_disposition::core::config::{GateConfig, UpdateConfig};
use adaptive_disposition::engine::gate::evaluate_gate;
use adaptive_disposition::engine::update::{ProposalIdentity, apply_update};
use adaptive_disposition::state::segment::{STATE_DIM, SegmentId, SegmentMap};
use adaptive_disposition::state::signals::{Signals, UpdateMetrics};
use adaptive_disposition::state::snapshot::{StateSnapshot, decode_vector, encode_vector};

fn snapshot_from(vector: Vec<f32>) -> StateSnapshot {
    StateSnapshot {
        version_id: "v0".to_string(),
        parent_id: None,
        vector,
        segment_map: SegmentMap::default_layout(),
        created_at: chrono::DateTime::UNIX_EPOCH,
        metrics: None,
    }
}

fn identity() -> ProposalIdentity {
    ProposalIdentity {
        version_id: "v1".to_string(),
        created_at: chrono::DateTime::UNIX_EPOCH,
    }
}

fn finite_vector() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-5.0f32..5.0, STATE_DIM)
}

fn signal_bundle() -> impl Strategy<Value = Signals> {
    (
        0.0f32..=1.0,
        0.0f32..=1.0,
        0.0f32..=1.0,
        prop::option::of(prop::collection::vec(-1.0f32..1.0, 32)),
    )
        .prop_map(|(sentiment, coherence, novelty, direction)| {
            let mut signals = Signals {
                sentiment_score: sentiment,
                coherence_score: coherence,
                novelty_score: novelty,
                ..Signals::default()
            };
            if let Some(direction) = direction {
                signals.direction_vectors.insert(SegmentId::Prefs, direction);
            }
            signals
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn update_is_bitwise_deterministic(
        vector in finite_vector(),
        signals in signal_bundle(),
        entropy in 0.0f32..2.0,
    ) {
        let state = snapshot_from(vector);
        let config = UpdateConfig::default();
        let a = apply_update(&state, &signals, entropy, &config, identity());
        let b = apply_update(&state, &signals, entropy, &config, identity());

        for (x, y) in a.proposed.vector.iter().zip(&b.proposed.vector) {
            prop_assert_eq!(x.to_bits(), y.to_bits());
        }
        prop_assert_eq!(a.action, b.action);
        prop_assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn segment_deltas_never_exceed_the_cap(
        vector in finite_vector(),
        signals in signal_bundle(),
        entropy in 0.0f32..2.0,
        learning_rate in 0.0f32..10.0,
        cap in 0.01f32..2.0,
    ) {
        let state = snapshot_from(vector);
        let config = UpdateConfig {
            learning_rate,
            max_delta_norm_per_segment: cap,
            max_state_norm: 0.0,
            ..UpdateConfig::default()
        };
        let out = apply_update(&state, &signals, entropy, &config, identity());
        let tolerance = f64::from(cap) * 1e-5 + 1e-9;
        for row in &out.metrics.per_segment {
            prop_assert!(
                row.delta_norm <= f64::from(cap) + tolerance,
                "segment {} delta {} exceeds cap {}",
                row.segment, row.delta_norm, cap
            );
        }
    }

    #[test]
    fn state_norm_respects_the_configured_bound(
        vector in finite_vector(),
        signals in signal_bundle(),
        entropy in 0.0f32..2.0,
        max_state_norm in 0.5f32..10.0,
    ) {
        let state = snapshot_from(vector);
        let config = UpdateConfig {
            max_state_norm,
            ..UpdateConfig::default()
        };
        let out = apply_update(&state, &signals, entropy, &config, identity());
        let bound = f64::from(max_state_norm);
        prop_assert!(
            out.proposed.l2_norm() <= bound * (1.0 + 1e-5) + 1e-9,
            "norm {} exceeds bound {}",
            out.proposed.l2_norm(),
            bound
        );
    }

    #[test]
    fn unreinforced_segments_decay_exactly_once(
        vector in finite_vector(),
        decay_rate in 0.0f32..0.5,
    ) {
        let state = snapshot_from(vector);
        let config = UpdateConfig {
            decay_rate,
            max_state_norm: 0.0,
            ..UpdateConfig::default()
        };
        // All signals zero and entropy zero: every segment is unreinforced.
        let out = apply_update(&state, &Signals::default(), 0.0, &config, identity());
        let keep = 1.0 - decay_rate;
        for (old, new) in state.vector.iter().zip(&out.proposed.vector) {
            let expected = if decay_rate > 0.0 { old * keep } else { *old };
            prop_assert_eq!(new.to_bits(), expected.to_bits());
        }
        prop_assert!(out.metrics.segments_hit.is_empty());
    }

    #[test]
    fn sign_fallback_preserves_existing_directions(
        vector in finite_vector(),
        strength in 0.001f32..=1.0,
    ) {
        let state = snapshot_from(vector);
        let signals = Signals {
            sentiment_score: strength,
            coherence_score: strength,
            novelty_score: strength,
            ..Signals::default()
        };
        let config = UpdateConfig {
            max_state_norm: 0.0,
            ..UpdateConfig::default()
        };
        let out = apply_update(&state, &signals, strength, &config, identity());
        for (old, new) in state.vector.iter().zip(&out.proposed.vector) {
            if *old > 0.0 {
                prop_assert!(*new >= *old, "positive element shrank: {old} -> {new}");
            } else if *old < 0.0 {
                prop_assert!(*new <= *old, "negative element shrank: {old} -> {new}");
            } else {
                prop_assert!(*new >= 0.0, "zero element went negative: {new}");
            }
        }
    }

    #[test]
    fn soft_scores_stay_in_unit_range(
        vector in finite_vector(),
        entropy in 0.0f32..3.0,
        delta in 0.0f64..10.0,
        hits in 0usize..=4,
    ) {
        let state = snapshot_from(vector);
        let metrics = UpdateMetrics {
            total_delta_norm: delta,
            segments_hit: SegmentId::ALL[..hits].to_vec(),
            per_segment: Vec::new(),
        };
        let decision = evaluate_gate(
            &state,
            &state,
            &Signals::default(),
            entropy,
            &metrics,
            &GateConfig::default(),
        );
        prop_assert!((0.0..=1.0).contains(&decision.soft_score));
    }

    #[test]
    fn vector_encoding_round_trips_bit_exactly(
        vector in prop::collection::vec(any::<f32>(), STATE_DIM),
    ) {
        let blob = encode_vector(&vector);
        prop_assert_eq!(blob.len(), STATE_DIM * 4);
        let decoded = decode_vector(&blob, STATE_DIM).unwrap();
        for (a, b) in vector.iter().zip(&decoded) {
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}

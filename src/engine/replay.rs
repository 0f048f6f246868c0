//! Deterministic in-memory replay of recorded interaction sequences.
//!
//! The harness runs update → gate → evaluator for each recorded turn without
//! touching persistent storage, RPCs, or clocks. Version ids and timestamps
//! are derived from the turn id, so repeated runs are bit-identical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::{EvalConfig, GateConfig, UpdateConfig};
use crate::engine::evaluator::{EvalOutcome, evaluate_state};
use crate::engine::gate::{GateAction, GateDecision, evaluate_gate};
use crate::engine::update::{ProposalIdentity, UpdateAction, apply_update};
use crate::state::signals::{Signals, UpdateMetrics};
use crate::state::snapshot::StateSnapshot;

/// One recorded interaction turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Monotonic turn number within the recording.
    pub turn_id: u64,
    /// Prompt presented this turn.
    pub prompt: String,
    /// Final generated response text.
    pub response_text: String,
    /// Generation entropy for the turn.
    pub entropy: f32,
    /// Signals observed for the turn.
    pub signals: Signals,
    /// Evidence identifiers injected this turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<String>>,
}

/// Bundled configuration for a replay run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Update-function knobs.
    pub update: UpdateConfig,
    /// Gate knobs.
    pub gate: GateConfig,
    /// Evaluator knobs.
    pub eval: EvalConfig,
}

/// Resolution of one replayed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    /// The proposal was committed and the state advanced.
    Commit,
    /// The update changed nothing.
    NoOp,
    /// The gate vetoed the proposal.
    GateReject,
    /// The evaluator failed the committed proposal; state restored.
    EvalRollback,
}

impl TurnAction {
    /// Stable wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::NoOp => "no_op",
            Self::GateReject => "gate_reject",
            Self::EvalRollback => "eval_rollback",
        }
    }
}

/// Full record of one replayed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Turn id from the interaction record.
    pub turn_id: u64,
    /// Resolution of the turn.
    pub action: TurnAction,
    /// Reason carried over from the deciding stage.
    pub reason: String,
    /// Raw update decision before gating.
    pub update_action: UpdateAction,
    /// Update metrics for the turn.
    pub metrics: UpdateMetrics,
    /// Gate decision when the gate ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,
    /// Evaluator outcome when the evaluator ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<EvalOutcome>,
    /// Version id active after the turn resolved.
    pub active_version_id: String,
}

/// Aggregated counts plus the final snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Number of turns replayed.
    pub total: usize,
    /// Turns that committed.
    pub commits: usize,
    /// Turns with no state change.
    pub no_ops: usize,
    /// Turns vetoed by the gate.
    pub gate_rejects: usize,
    /// Turns rolled back by the evaluator.
    pub eval_rollbacks: usize,
    /// Snapshot active after the last turn.
    pub final_snapshot: StateSnapshot,
}

/// Results plus summary for a whole replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Per-turn results in input order.
    pub results: Vec<TurnResult>,
    /// Aggregate summary.
    pub summary: ReplaySummary,
}

/// Deterministic version id for a replayed turn.
#[must_use]
pub fn replay_version_id(turn_id: u64) -> String {
    format!("replay-{turn_id:06}")
}

/// Deterministic timestamp for a replayed turn: Unix epoch plus the turn id
/// in seconds.
#[must_use]
pub fn replay_timestamp(turn_id: u64) -> DateTime<Utc> {
    let offset = i64::try_from(turn_id).unwrap_or(i64::MAX);
    DateTime::UNIX_EPOCH + chrono::Duration::seconds(offset)
}

/// Replay a recorded sequence from a start snapshot, entirely in memory.
#[must_use]
pub fn replay(
    start: &StateSnapshot,
    interactions: &[Interaction],
    config: &ReplayConfig,
) -> ReplayReport {
    let mut current = start.clone();
    let mut results = Vec::with_capacity(interactions.len());
    let mut commits = 0usize;
    let mut no_ops = 0usize;
    let mut gate_rejects = 0usize;
    let mut eval_rollbacks = 0usize;

    for interaction in interactions {
        let identity = ProposalIdentity {
            version_id: replay_version_id(interaction.turn_id),
            created_at: replay_timestamp(interaction.turn_id),
        };
        let update = apply_update(
            &current,
            &interaction.signals,
            interaction.entropy,
            &config.update,
            identity,
        );

        if update.action == UpdateAction::NoOp {
            no_ops += 1;
            results.push(TurnResult {
                turn_id: interaction.turn_id,
                action: TurnAction::NoOp,
                reason: "update produced no change".to_string(),
                update_action: update.action,
                metrics: update.metrics,
                gate: None,
                eval: None,
                active_version_id: current.version_id.clone(),
            });
            continue;
        }

        let gate = evaluate_gate(
            &current,
            &update.proposed,
            &interaction.signals,
            interaction.entropy,
            &update.metrics,
            &config.gate,
        );
        if gate.action == GateAction::Reject {
            gate_rejects += 1;
            results.push(TurnResult {
                turn_id: interaction.turn_id,
                action: TurnAction::GateReject,
                reason: gate.reason.clone(),
                update_action: update.action,
                metrics: update.metrics,
                gate: Some(gate),
                eval: None,
                active_version_id: current.version_id.clone(),
            });
            continue;
        }

        let eval = evaluate_state(&update.proposed, interaction.entropy, &config.eval);
        if eval.passed {
            commits += 1;
            current = update.proposed;
            results.push(TurnResult {
                turn_id: interaction.turn_id,
                action: TurnAction::Commit,
                reason: gate.reason.clone(),
                update_action: update.action,
                metrics: update.metrics,
                gate: Some(gate),
                eval: Some(eval),
                active_version_id: current.version_id.clone(),
            });
        } else {
            eval_rollbacks += 1;
            results.push(TurnResult {
                turn_id: interaction.turn_id,
                action: TurnAction::EvalRollback,
                reason: format!("eval rollback: {}", eval.reason),
                update_action: update.action,
                metrics: update.metrics,
                gate: Some(gate),
                eval: Some(eval),
                active_version_id: current.version_id.clone(),
            });
        }
    }

    let summary = ReplaySummary {
        total: results.len(),
        commits,
        no_ops,
        gate_rejects,
        eval_rollbacks,
        final_snapshot: current,
    };
    ReplayReport { results, summary }
}

// ──────────────────── fixtures ────────────────────

/// Expected action for one turn, used by the replay tool to diff runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedTurn {
    /// Turn id the expectation applies to.
    pub turn_id: u64,
    /// Expected resolution.
    pub action: TurnAction,
}

/// On-disk replay fixture: start state, interactions, optional expectations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFixture {
    /// Snapshot to start the replay from.
    pub start: StateSnapshot,
    /// Recorded interactions in order.
    pub interactions: Vec<Interaction>,
    /// Expected per-turn actions; empty means "report only".
    #[serde(default)]
    pub expected: Vec<ExpectedTurn>,
    /// Configuration override; defaults apply when absent.
    #[serde(default)]
    pub config: ReplayConfig,
}

/// One divergence between a replay run and its fixture expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Turn id where the run diverged.
    pub turn_id: u64,
    /// Action the fixture expected.
    pub expected: TurnAction,
    /// Action the run produced, absent when the turn is missing entirely.
    pub actual: Option<TurnAction>,
}

/// Compare a report against fixture expectations, returning every mismatch.
#[must_use]
pub fn diff_expectations(report: &ReplayReport, expected: &[ExpectedTurn]) -> Vec<Divergence> {
    let mut divergences = Vec::new();
    for expectation in expected {
        let actual = report
            .results
            .iter()
            .find(|result| result.turn_id == expectation.turn_id)
            .map(|result| result.action);
        if actual != Some(expectation.action) {
            divergences.push(Divergence {
                turn_id: expectation.turn_id,
                expected: expectation.action,
                actual,
            });
        }
    }
    divergences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::segment::{SegmentId, SegmentMap};

    fn seeded_start() -> StateSnapshot {
        let mut snap =
            StateSnapshot::initial("v0".into(), SegmentMap::default_layout(), replay_timestamp(0));
        let range = snap.segment_map.range(SegmentId::Prefs).unwrap();
        for v in &mut snap.vector[range] {
            *v = 0.1;
        }
        snap
    }

    fn turn(turn_id: u64, signals: Signals, entropy: f32) -> Interaction {
        Interaction {
            turn_id,
            prompt: format!("prompt {turn_id}"),
            response_text: format!("response {turn_id}"),
            entropy,
            signals,
            evidence: None,
        }
    }

    fn positive_signals() -> Signals {
        Signals {
            sentiment_score: 0.6,
            ..Signals::default()
        }
    }

    #[test]
    fn replay_is_deterministic() {
        let start = seeded_start();
        let interactions = vec![
            turn(1, positive_signals(), 0.4),
            turn(2, Signals::default(), 0.0),
            turn(
                3,
                Signals {
                    user_correction: true,
                    ..positive_signals()
                },
                0.4,
            ),
        ];
        let config = ReplayConfig::default();
        let a = replay(&start, &interactions, &config);
        let b = replay(&start, &interactions, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn commit_advances_and_reject_holds_state() {
        let start = seeded_start();
        let interactions = vec![
            turn(1, positive_signals(), 0.0),
            turn(
                2,
                Signals {
                    user_correction: true,
                    ..positive_signals()
                },
                0.0,
            ),
            turn(3, positive_signals(), 0.0),
        ];
        let report = replay(&start, &interactions, &ReplayConfig::default());
        assert_eq!(report.results[0].action, TurnAction::Commit);
        assert_eq!(report.results[0].active_version_id, replay_version_id(1));
        assert_eq!(report.results[1].action, TurnAction::GateReject);
        assert_eq!(
            report.results[1].active_version_id,
            replay_version_id(1),
            "rejected turn keeps the prior active version"
        );
        assert_eq!(report.results[2].action, TurnAction::Commit);
        assert_eq!(report.summary.commits, 2);
        assert_eq!(report.summary.gate_rejects, 1);
        assert_eq!(
            report.summary.final_snapshot.version_id,
            replay_version_id(3)
        );
    }

    #[test]
    fn no_op_turn_keeps_state_and_counts() {
        let start = StateSnapshot::initial(
            "v0".into(),
            SegmentMap::default_layout(),
            replay_timestamp(0),
        );
        let report = replay(
            &start,
            &[turn(1, Signals::default(), 0.0)],
            &ReplayConfig::default(),
        );
        assert_eq!(report.results[0].action, TurnAction::NoOp);
        assert_eq!(report.results[0].active_version_id, "v0");
        assert_eq!(report.summary.no_ops, 1);
        assert_eq!(report.summary.final_snapshot.version_id, "v0");
    }

    #[test]
    fn eval_failure_rolls_back() {
        let mut start = seeded_start();
        for v in &mut start.vector {
            *v = 2.0;
        }
        let config = ReplayConfig {
            update: UpdateConfig {
                max_state_norm: 0.0,
                ..UpdateConfig::default()
            },
            // The seeded risk segment sits above the default cap; raise it so
            // the failure is the evaluator's to report.
            gate: GateConfig {
                risk_segment_cap: 100.0,
                ..GateConfig::default()
            },
            eval: EvalConfig {
                max_state_norm: 0.001,
                ..EvalConfig::default()
            },
        };
        let report = replay(&start, &[turn(1, positive_signals(), 0.5)], &config);
        assert_eq!(report.results[0].action, TurnAction::EvalRollback);
        assert!(report.results[0].reason.starts_with("eval rollback:"));
        assert_eq!(report.results[0].active_version_id, "v0");
        assert_eq!(report.summary.eval_rollbacks, 1);
        assert_eq!(report.summary.final_snapshot.version_id, "v0");
    }

    #[test]
    fn fixture_roundtrips_through_json() {
        let fixture = ReplayFixture {
            start: seeded_start(),
            interactions: vec![turn(1, positive_signals(), 0.4)],
            expected: vec![ExpectedTurn {
                turn_id: 1,
                action: TurnAction::Commit,
            }],
            config: ReplayConfig::default(),
        };
        let json = serde_json::to_string(&fixture).unwrap();
        let parsed: ReplayFixture = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fixture);
    }

    #[test]
    fn diff_reports_divergence_and_missing_turns() {
        let start = seeded_start();
        let report = replay(
            &start,
            &[turn(1, positive_signals(), 0.0)],
            &ReplayConfig::default(),
        );
        let expected = vec![
            ExpectedTurn {
                turn_id: 1,
                action: TurnAction::GateReject,
            },
            ExpectedTurn {
                turn_id: 9,
                action: TurnAction::Commit,
            },
        ];
        let divergences = diff_expectations(&report, &expected);
        assert_eq!(divergences.len(), 2);
        assert_eq!(divergences[0].actual, Some(TurnAction::Commit));
        assert_eq!(divergences[1].actual, None);
    }

    #[test]
    fn matching_expectations_diff_clean() {
        let start = seeded_start();
        let report = replay(
            &start,
            &[turn(1, positive_signals(), 0.0)],
            &ReplayConfig::default(),
        );
        let expected = vec![ExpectedTurn {
            turn_id: 1,
            action: TurnAction::Commit,
        }];
        assert!(diff_expectations(&report, &expected).is_empty());
    }
}

//! Per-turn orchestration: generate, retrieve, update, gate, commit,
//! evaluate, record.
//!
//! The loop is single-threaded and cooperative: one turn completes before
//! the next begins, and the active pointer only moves inside the store's
//! `commit`/`rollback`, so an aborted turn leaves the store in its pre-turn
//! state. Generation failures abort the turn; retrieval and evidence-store
//! failures are logged and skipped.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Codec, Generation};
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::engine::evaluator::{EvalOutcome, evaluate_state};
use crate::engine::gate::{GateAction, GateDecision, evaluate_gate};
use crate::engine::replay::TurnAction;
use crate::engine::update::{ProposalIdentity, UpdateAction, apply_update};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::retrieval::gate::{RetrievalOutcome, run_retrieval};
use crate::state::segment::SegmentMap;
use crate::state::signals::{Signals, UpdateMetrics};
use crate::state::snapshot::StateSnapshot;
use crate::store::provenance::{Decision, ProvenanceEntry, TriggerType};
use crate::store::sqlite::DispositionStore;

/// Everything one turn produced, for callers and front-ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// How the turn resolved.
    pub action: TurnAction,
    /// Final generation presented to the user.
    pub response: Generation,
    /// Retrieval cascade outcome, absent when retrieval errored out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalOutcome>,
    /// Evidence references injected into the final generation.
    pub evidence_ids: Vec<String>,
    /// Update metrics for the turn.
    pub metrics: UpdateMetrics,
    /// Gate decision when the gate ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,
    /// Evaluator outcome when the evaluator ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<EvalOutcome>,
    /// Version active after the turn.
    pub active_version_id: String,
}

/// The adaptive disposition controller.
pub struct Controller<C: Codec> {
    store: DispositionStore,
    codec: C,
    config: Config,
    jsonl: Option<JsonlWriter>,
}

impl<C: Codec> Controller<C> {
    /// Build a controller over an opened store and codec.
    pub fn new(store: DispositionStore, codec: C, config: Config) -> Self {
        let jsonl = config.telemetry.enabled.then(|| {
            JsonlWriter::open(
                config.telemetry.jsonl_path.clone(),
                Some(config.telemetry.fallback_path.clone()),
            )
        });
        Self {
            store,
            codec,
            config,
            jsonl,
        }
    }

    /// Borrow the underlying store (for status/history front-ends).
    pub fn store(&self) -> &DispositionStore {
        &self.store
    }

    /// Borrow the codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Return the active snapshot, creating the zero-vector initial snapshot
    /// on first use.
    pub fn ensure_initialized(&mut self) -> Result<StateSnapshot> {
        match self.store.get_active() {
            Ok(active) => Ok(active),
            Err(_) => {
                let initial = self.store.create_initial(SegmentMap::default_layout())?;
                self.store.append_provenance(
                    &ProvenanceEntry::new(
                        initial.version_id.clone(),
                        TriggerType::Init,
                        Decision::Commit,
                    )
                    .with_reason("initial zero-vector snapshot"),
                )?;
                self.log(|entry| {
                    entry.event = EventType::StoreInit;
                    entry.version_id = Some(initial.version_id.clone());
                });
                Ok(initial)
            }
        }
    }

    /// Run one full interaction turn.
    pub fn run_turn(&mut self, prompt: &str, signals: &Signals) -> Result<TurnReport> {
        let active = self.store.get_active()?;

        // First pass: generate without evidence. A failure aborts the turn
        // with the active pointer untouched.
        let first = self.codec.generate(prompt, &active.vector, &[], &[])?;

        // Retrieval is best-effort: an RPC failure skips evidence injection.
        let retrieval = match run_retrieval(&self.codec, prompt, first.entropy, &self.config.retrieval)
        {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.log(|entry| {
                    entry.event = EventType::RetrievalSkip;
                    entry.severity = Severity::Warning;
                    entry.error_code = Some(err.code().to_string());
                    entry.reason = Some(err.to_string());
                });
                None
            }
        };

        let mut evidence_ids: Vec<String> = Vec::new();
        let mut evidence_texts: Vec<String> = Vec::new();
        if let Some(outcome) = &retrieval {
            for record in &outcome.retrieved {
                evidence_ids.push(record.id.clone());
                evidence_texts.push(record.text.clone());
            }
        }

        // Optional web-search fallback on high-entropy turns.
        if self.config.web_search.enabled && first.entropy > self.config.web_search.entropy_threshold
        {
            match self
                .codec
                .web_search(prompt, self.config.web_search.max_results)
            {
                Ok(hits) => {
                    for hit in hits {
                        evidence_ids.push(hit.url.clone());
                        evidence_texts.push(format!("{}: {}", hit.title, hit.snippet));
                    }
                }
                Err(err) => self.log(|entry| {
                    entry.event = EventType::RetrievalSkip;
                    entry.severity = Severity::Warning;
                    entry.error_code = Some(err.code().to_string());
                    entry.reason = Some(format!("web search failed: {err}"));
                }),
            }
        }

        // Second pass with evidence, when any survived the cascade.
        let response = if evidence_texts.is_empty() {
            first
        } else {
            self.codec
                .generate(prompt, &active.vector, &evidence_texts, &first.context_tokens)?
        };

        // Store the exchange as future evidence; failure is non-fatal.
        if let Err(err) = self.codec.store_evidence(
            &format!("Q: {prompt}\nA: {}", response.text),
            Some(&format!(r#"{{"entropy":{}}}"#, response.entropy)),
        ) {
            self.log(|entry| {
                entry.event = EventType::Error;
                entry.severity = Severity::Warning;
                entry.error_code = Some(err.code().to_string());
                entry.reason = Some(format!("evidence store failed: {err}"));
            });
        }

        let update = apply_update(
            &active,
            signals,
            response.entropy,
            &self.config.update,
            ProposalIdentity {
                version_id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
            },
        );

        let signals_json = serde_json::to_string(signals)?;
        let base_entry = |version_id: &str, decision: Decision| {
            ProvenanceEntry::new(version_id.to_string(), TriggerType::Interaction, decision)
                .with_context(prompt)
                .with_signals_json(signals_json.clone())
                .with_evidence_ids(&evidence_ids)
        };

        if update.action == UpdateAction::NoOp {
            self.store.append_provenance(
                &base_entry(&active.version_id, Decision::NoOp)
                    .with_reason("update produced no change"),
            )?;
            self.log(|entry| {
                entry.event = EventType::TurnNoOp;
                entry.version_id = Some(active.version_id.clone());
                entry.entropy = Some(response.entropy);
            });
            return Ok(TurnReport {
                action: TurnAction::NoOp,
                response,
                retrieval,
                evidence_ids,
                metrics: update.metrics,
                gate: None,
                eval: None,
                active_version_id: active.version_id,
            });
        }

        let gate = evaluate_gate(
            &active,
            &update.proposed,
            signals,
            response.entropy,
            &update.metrics,
            &self.config.gate,
        );
        if gate.action == GateAction::Reject {
            self.store.append_provenance(
                &base_entry(&active.version_id, Decision::Reject).with_reason(gate.reason.clone()),
            )?;
            self.log(|entry| {
                entry.event = EventType::GateReject;
                entry.severity = Severity::Warning;
                entry.version_id = Some(active.version_id.clone());
                entry.entropy = Some(response.entropy);
                entry.delta_norm = Some(update.metrics.total_delta_norm);
                entry.reason = Some(gate.reason.clone());
            });
            return Ok(TurnReport {
                action: TurnAction::GateReject,
                response,
                retrieval,
                evidence_ids,
                metrics: update.metrics,
                gate: Some(gate),
                eval: None,
                active_version_id: active.version_id,
            });
        }

        self.store.commit(&update.proposed)?;

        let eval = evaluate_state(&update.proposed, response.entropy, &self.config.eval);
        if eval.passed {
            self.store.append_provenance(
                &base_entry(&update.proposed.version_id, Decision::Commit)
                    .with_reason(gate.reason.clone()),
            )?;
            self.log(|entry| {
                entry.event = EventType::TurnCommit;
                entry.version_id = Some(update.proposed.version_id.clone());
                entry.entropy = Some(response.entropy);
                entry.delta_norm = Some(update.metrics.total_delta_norm);
                entry.soft_score = Some(gate.soft_score);
                entry.evidence_count = Some(evidence_ids.len());
            });
            Ok(TurnReport {
                action: TurnAction::Commit,
                response,
                retrieval,
                evidence_ids,
                metrics: update.metrics,
                gate: Some(gate),
                eval: Some(eval),
                active_version_id: update.proposed.version_id.clone(),
            })
        } else {
            self.store.rollback(&active.version_id)?;
            let reason = format!("eval rollback: {}", eval.reason);
            self.store.append_provenance(
                &base_entry(&update.proposed.version_id, Decision::Reject)
                    .with_reason(reason.clone()),
            )?;
            self.log(|entry| {
                entry.event = EventType::EvalRollback;
                entry.severity = Severity::Warning;
                entry.version_id = Some(active.version_id.clone());
                entry.entropy = Some(response.entropy);
                entry.delta_norm = Some(update.metrics.total_delta_norm);
                entry.reason = Some(reason);
            });
            Ok(TurnReport {
                action: TurnAction::EvalRollback,
                response,
                retrieval,
                evidence_ids,
                metrics: update.metrics,
                gate: Some(gate),
                eval: Some(eval),
                active_version_id: active.version_id,
            })
        }
    }

    fn log(&mut self, fill: impl FnOnce(&mut LogEntry)) {
        if let Some(writer) = self.jsonl.as_mut() {
            let mut entry = LogEntry::new(EventType::Error, Severity::Info);
            fill(&mut entry);
            writer.write_entry(&entry);
            writer.flush();
        }
    }
}

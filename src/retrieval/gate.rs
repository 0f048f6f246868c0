//! Three-gate retrieval cascade over the codec's evidence search.
//!
//! Gate 1 checks generation confidence, gate 2 runs the similarity search,
//! gate 3 filters for consistency (empty, oversized, duplicate records), and
//! gate 3.5 enforces topic coherence against the prompt's content tokens.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, EvidenceRecord};
use crate::core::config::RetrievalConfig;
use crate::core::errors::{AdcError, Result};
use crate::retrieval::keywords::{content_tokens, shared_keyword_count};

/// Outcome of one retrieval cascade run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    /// Whether the confidence gate passed (or was bypassed).
    pub gate1_passed: bool,
    /// Rows returned by the similarity search.
    pub gate2_count: usize,
    /// Rows surviving consistency and topic coherence.
    pub gate3_count: usize,
    /// The surviving evidence, in search order.
    pub retrieved: Vec<EvidenceRecord>,
    /// Which gate stopped the cascade, or the retention summary.
    pub reason: String,
}

impl RetrievalOutcome {
    fn skipped(reason: String) -> Self {
        Self {
            gate1_passed: false,
            gate2_count: 0,
            gate3_count: 0,
            retrieved: Vec::new(),
            reason,
        }
    }
}

/// Run the cascade. A search RPC failure is returned as an error for the
/// caller to treat as non-fatal; an empty search result is not an error.
pub fn run_retrieval(
    codec: &dyn Codec,
    prompt: &str,
    entropy: f32,
    config: &RetrievalConfig,
) -> Result<RetrievalOutcome> {
    // Gate 1: only retrieve when the generator is unsure.
    if !config.always_retrieve && entropy < config.entropy_threshold {
        return Ok(RetrievalOutcome::skipped(format!(
            "gate1: entropy {entropy:.3} < threshold {:.3}",
            config.entropy_threshold
        )));
    }

    // Gate 2: similarity search; the backend enforces the threshold.
    let hits = codec
        .search(prompt, config.top_k, config.similarity_threshold)
        .map_err(|err| AdcError::Retrieval {
            details: format!("search failed: {err}"),
        })?;
    let gate2_count = hits.len();
    if hits.is_empty() {
        return Ok(RetrievalOutcome {
            gate1_passed: true,
            gate2_count: 0,
            gate3_count: 0,
            retrieved: Vec::new(),
            reason: "gate2: no results above similarity threshold".to_string(),
        });
    }

    // Gate 3: consistency — drop empty, oversized, and duplicate records.
    let mut seen: HashSet<&str> = HashSet::with_capacity(hits.len());
    let mut survivors: Vec<&EvidenceRecord> = Vec::with_capacity(hits.len());
    for record in &hits {
        if record.text.is_empty() {
            continue;
        }
        if record.text.len() > config.max_evidence_len {
            continue;
        }
        if !seen.insert(record.id.as_str()) {
            continue;
        }
        survivors.push(record);
    }

    // Gate 3.5: topic coherence. A prompt with no content tokens bypasses
    // the filter entirely.
    let prompt_tokens = content_tokens(prompt);
    let retrieved: Vec<EvidenceRecord> = if prompt_tokens.is_empty() {
        survivors.into_iter().cloned().collect()
    } else {
        survivors
            .into_iter()
            .filter(|record| {
                let record_tokens = content_tokens(&record.text);
                shared_keyword_count(&prompt_tokens, &record_tokens) >= config.min_shared_keywords
            })
            .cloned()
            .collect()
    };

    let gate3_count = retrieved.len();
    let reason = if gate3_count == 0 {
        "gate3: no evidence survived consistency and coherence filters".to_string()
    } else {
        format!("gate3: {gate3_count} of {gate2_count} evidence records retained")
    };
    Ok(RetrievalOutcome {
        gate1_passed: true,
        gate2_count,
        gate3_count,
        retrieved,
        reason,
    })
}

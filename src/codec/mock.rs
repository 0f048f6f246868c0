//! Deterministic in-memory codec for tests and offline tooling.
//!
//! Every call is a pure function of the mock's explicit state: embeddings are
//! FNV-hashed token buckets, search is keyword overlap against stored
//! evidence, and generations come from a scripted queue with an echo
//! fallback. No clocks, no randomness.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::codec::{Codec, EvidenceRecord, Generation, WebHit};
use crate::core::errors::{AdcError, Result};
use crate::retrieval::keywords::content_tokens;

const EMBED_DIM: usize = 32;

#[derive(Debug, Default)]
struct MockState {
    evidence: Vec<EvidenceRecord>,
    scripted: VecDeque<Generation>,
    web_hits: Vec<WebHit>,
    next_id: u64,
    fail_generate: bool,
    fail_search: bool,
}

/// Deterministic codec fake.
#[derive(Debug)]
pub struct MockCodec {
    inner: Mutex<MockState>,
    default_entropy: f32,
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCodec {
    /// Empty mock with a 0.5 default generation entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockState::default()),
            default_entropy: 0.5,
        }
    }

    /// Empty mock with a fixed default generation entropy.
    #[must_use]
    pub fn with_entropy(default_entropy: f32) -> Self {
        Self {
            inner: Mutex::new(MockState::default()),
            default_entropy,
        }
    }

    /// Queue a scripted generation; consumed in FIFO order.
    pub fn push_generation(&self, generation: Generation) {
        self.inner.lock().scripted.push_back(generation);
    }

    /// Seed the web-search results returned by every `web_search` call.
    pub fn set_web_hits(&self, hits: Vec<WebHit>) {
        self.inner.lock().web_hits = hits;
    }

    /// Make subsequent `generate` calls fail.
    pub fn set_fail_generate(&self, fail: bool) {
        self.inner.lock().fail_generate = fail;
    }

    /// Make subsequent `search` calls fail.
    pub fn set_fail_search(&self, fail: bool) {
        self.inner.lock().fail_search = fail;
    }

    /// Number of evidence records currently stored.
    #[must_use]
    pub fn evidence_len(&self) -> usize {
        self.inner.lock().evidence.len()
    }
}

impl Codec for MockCodec {
    fn generate(
        &self,
        prompt: &str,
        _state: &[f32],
        evidence: &[String],
        _context_tokens: &[u32],
    ) -> Result<Generation> {
        let mut state = self.inner.lock();
        if state.fail_generate {
            return Err(AdcError::Codec {
                op: "generate",
                details: "mock generate failure injected".to_string(),
            });
        }
        if let Some(scripted) = state.scripted.pop_front() {
            return Ok(scripted);
        }
        let text = if evidence.is_empty() {
            format!("echo: {prompt}")
        } else {
            format!("echo+{}: {prompt}", evidence.len())
        };
        Ok(Generation {
            text,
            entropy: self.default_entropy,
            logits: None,
            context_tokens: Vec::new(),
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBED_DIM];
        for token in content_tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % EMBED_DIM as u64) as usize;
            let magnitude = ((hash >> 8) % 1000) as f32 / 1000.0 - 0.5;
            vector[bucket] += magnitude;
        }
        let norm = vector.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
        if norm > 0.0 {
            let inv = (1.0 / norm) as f32;
            for value in &mut vector {
                *value *= inv;
            }
        }
        Ok(vector)
    }

    fn search(
        &self,
        query: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<EvidenceRecord>> {
        let state = self.inner.lock();
        if state.fail_search {
            return Err(AdcError::Codec {
                op: "search",
                details: "mock search failure injected".to_string(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_tokens = content_tokens(query);
        let mut hits: Vec<EvidenceRecord> = state
            .evidence
            .iter()
            .filter_map(|record| {
                let record_tokens = content_tokens(&record.text);
                let shared = query_tokens.intersection(&record_tokens).count();
                let denominator = query_tokens.len().max(1);
                let score = shared as f32 / denominator as f32;
                (score >= similarity_threshold && score > 0.0).then(|| EvidenceRecord {
                    score,
                    ..record.clone()
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn store_evidence(&self, text: &str, metadata_json: Option<&str>) -> Result<String> {
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = format!("ev-{:06}", state.next_id);
        state.evidence.push(EvidenceRecord {
            id: id.clone(),
            text: text.to_string(),
            score: 0.0,
            metadata_json: metadata_json.map(str::to_string),
        });
        Ok(id)
    }

    fn web_search(&self, _query: &str, max_results: usize) -> Result<Vec<WebHit>> {
        let state = self.inner.lock();
        let mut hits = state.web_hits.clone();
        hits.truncate(max_results);
        Ok(hits)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

//! Capability boundary to the frozen language-model codec.
//!
//! The controller consumes five calls — generate, embed, search, store
//! evidence, web search — behind one trait so tests and offline tooling can
//! substitute a deterministic fake. Implementations are expected to honor
//! the per-call deadlines in [`crate::core::config::TimeoutConfig`] and
//! surface expiry as [`crate::core::errors::AdcError::CodecTimeout`].

pub mod mock;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// One generation result from the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Entropy of the generation.
    pub entropy: f32,
    /// Raw logits when the backend exposes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logits: Option<Vec<f32>>,
    /// Opaque context tokens to thread into the next call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_tokens: Vec<u32>,
}

/// One search hit: stored evidence scored against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Opaque evidence identifier.
    pub id: String,
    /// Evidence text.
    pub text: String,
    /// Similarity score against the query.
    pub score: f32,
    /// Backend metadata, JSON-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<String>,
}

/// One web-search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebHit {
    /// Result title.
    pub title: String,
    /// Result snippet.
    pub snippet: String,
    /// Result URL.
    pub url: String,
}

/// Minimal capability set the controller needs from the codec.
pub trait Codec {
    /// Generate text conditioned on the prompt, the disposition vector, and
    /// optional evidence strings.
    fn generate(
        &self,
        prompt: &str,
        state: &[f32],
        evidence: &[String],
        context_tokens: &[u32],
    ) -> Result<Generation>;

    /// Embed a text into the backend's vector space.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Search stored evidence; the backend enforces the similarity threshold
    /// and returns at most `top_k` rows, best first.
    fn search(
        &self,
        query: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<EvidenceRecord>>;

    /// Persist a piece of evidence, returning its identifier.
    fn store_evidence(&self, text: &str, metadata_json: Option<&str>) -> Result<String>;

    /// Search the open web, returning at most `max_results` hits.
    fn web_search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>>;
}

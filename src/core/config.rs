//! Configuration system: TOML file + env var overrides + literal defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{AdcError, Result};
use crate::core::paths;

/// Full controller configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub update: UpdateConfig,
    pub gate: GateConfig,
    pub eval: EvalConfig,
    pub retrieval: RetrievalConfig,
    pub timeouts: TimeoutConfig,
    pub web_search: WebSearchConfig,
    pub telemetry: TelemetryConfig,
    pub paths: PathsConfig,
}

/// Update-function knobs: decay and bounded delta.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdateConfig {
    /// Scale applied to signal strength when building a delta.
    pub learning_rate: f32,
    /// Per-turn shrink factor for unreinforced segments.
    pub decay_rate: f32,
    /// L2 cap for any single segment's delta.
    pub max_delta_norm_per_segment: f32,
    /// L2 cap for the whole post-update vector; 0 disables.
    pub max_state_norm: f32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            decay_rate: 0.005,
            max_delta_norm_per_segment: 1.0,
            max_state_norm: 3.0,
        }
    }
}

/// Hard-veto gate knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// L2 cap on the proposal's distance from the current state.
    pub max_delta_norm: f32,
    /// L2 cap on the proposal's full vector.
    pub max_state_norm: f32,
    /// Reserved: minimum entropy drop for the soft score's entropy
    /// component. The current scorer uses post-generation entropy directly.
    pub min_entropy_drop: f32,
    /// L2 cap on the proposal's risk segment.
    pub risk_segment_cap: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_delta_norm: 5.0,
            max_state_norm: 50.0,
            min_entropy_drop: 0.1,
            risk_segment_cap: 10.0,
        }
    }
}

/// Post-commit evaluator knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    /// Blocking cap on the committed vector's L2 norm.
    pub max_state_norm: f32,
    /// Blocking cap on each segment's L2 norm.
    pub max_segment_norm: f32,
    /// Informational entropy baseline; never blocks.
    pub entropy_baseline: f32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_state_norm: 50.0,
            max_segment_norm: 15.0,
            entropy_baseline: 2.0,
        }
    }
}

/// Retrieval-gate knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Bypass the confidence gate entirely.
    pub always_retrieve: bool,
    /// Gate 1: minimum entropy before retrieval is worth the call.
    pub entropy_threshold: f32,
    /// Gate 2: similarity floor passed to the search backend.
    pub similarity_threshold: f32,
    /// Gate 2: maximum rows requested from the search backend.
    pub top_k: usize,
    /// Gate 3: maximum evidence text length in bytes.
    pub max_evidence_len: usize,
    /// Gate 3.5: minimum keywords shared with the prompt.
    pub min_shared_keywords: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            always_retrieve: false,
            entropy_threshold: 0.5,
            similarity_threshold: 0.3,
            top_k: 5,
            max_evidence_len: 2000,
            min_shared_keywords: 1,
        }
    }
}

/// Per-call codec deadlines in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub generate_secs: u64,
    pub search_secs: u64,
    pub store_secs: u64,
    pub embed_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generate_secs: 60,
            search_secs: 30,
            store_secs: 15,
            embed_secs: 15,
        }
    }
}

/// Web-search fallback toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSearchConfig {
    /// Master switch; disabled by default.
    pub enabled: bool,
    /// Maximum results requested per query.
    pub max_results: usize,
    /// Deadline for one web-search call, seconds.
    pub timeout_secs: u64,
    /// Entropy above which the fallback fires.
    pub entropy_threshold: f32,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_results: 5,
            timeout_secs: 20,
            entropy_threshold: 0.8,
        }
    }
}

/// Turn-event JSONL logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Master switch for the JSONL mirror.
    pub enabled: bool,
    /// Primary JSONL path.
    pub jsonl_path: PathBuf,
    /// RAM-backed fallback path used when the primary is unwritable.
    pub fallback_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_path: paths::default_data_dir().join("adc.jsonl"),
            fallback_path: PathBuf::from("/dev/shm/adc.jsonl"),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Data directory for the store and logs.
    pub data_dir: PathBuf,
    /// SQLite database path.
    pub db_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = paths::default_data_dir();
        let db_path = data_dir.join("adc.db");
        Self { data_dir, db_path }
    }
}

impl Config {
    /// Load configuration with the standard precedence: explicit path, then
    /// `ADC_CONFIG`, then the default location if present, then defaults.
    /// Env var overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = if path.is_some() {
            path.map(Path::to_path_buf)
        } else {
            env::var_os("ADC_CONFIG").map(PathBuf::from)
        };

        let mut config = match resolved {
            Some(file) => {
                if !file.exists() {
                    return Err(AdcError::MissingConfig { path: file });
                }
                Self::from_toml_file(&file)?
            }
            None => {
                let default_file = paths::default_config_path();
                if default_file.exists() {
                    Self::from_toml_file(&default_file)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| AdcError::io(path, source))?;
        Ok(toml::from_str(&raw)?)
    }

    /// Apply the enumerated environment overrides from the process env.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|name| env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (testable seam).
    pub fn apply_env_overrides_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        let nonempty = |name: &str| get(name).filter(|raw| !raw.trim().is_empty());

        if let Some(secs) = nonempty("TIMEOUT_GENERATE").and_then(|raw| raw.trim().parse().ok()) {
            self.timeouts.generate_secs = secs;
        }
        if let Some(secs) = nonempty("TIMEOUT_SEARCH").and_then(|raw| raw.trim().parse().ok()) {
            self.timeouts.search_secs = secs;
        }
        if let Some(secs) = nonempty("TIMEOUT_STORE").and_then(|raw| raw.trim().parse().ok()) {
            self.timeouts.store_secs = secs;
        }
        if let Some(secs) = nonempty("TIMEOUT_EMBED").and_then(|raw| raw.trim().parse().ok()) {
            self.timeouts.embed_secs = secs;
        }
        if let Some(flag) = nonempty("WEB_SEARCH_ENABLED").map(|raw| parse_bool(&raw)) {
            self.web_search.enabled = flag;
        }
        if let Some(max) = nonempty("WEB_SEARCH_MAX_RESULTS").and_then(|raw| raw.trim().parse().ok())
        {
            self.web_search.max_results = max;
        }
        if let Some(secs) = nonempty("WEB_SEARCH_TIMEOUT").and_then(|raw| raw.trim().parse().ok()) {
            self.web_search.timeout_secs = secs;
        }
        if let Some(threshold) =
            nonempty("WEB_SEARCH_ENTROPY_THRESHOLD").and_then(|raw| raw.trim().parse().ok())
        {
            self.web_search.entropy_threshold = threshold;
        }
    }

    /// Reject out-of-range values before anything touches the store.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if !(self.update.learning_rate.is_finite() && self.update.learning_rate >= 0.0) {
            problems.push("update.learning_rate must be finite and >= 0".to_string());
        }
        if !(self.update.decay_rate.is_finite()
            && (0.0..1.0).contains(&self.update.decay_rate))
        {
            problems.push("update.decay_rate must be in [0, 1)".to_string());
        }
        if !(self.update.max_delta_norm_per_segment.is_finite()
            && self.update.max_delta_norm_per_segment > 0.0)
        {
            problems.push("update.max_delta_norm_per_segment must be > 0".to_string());
        }
        if !(self.update.max_state_norm.is_finite() && self.update.max_state_norm >= 0.0) {
            problems.push("update.max_state_norm must be >= 0 (0 disables)".to_string());
        }
        if !(self.gate.max_delta_norm.is_finite() && self.gate.max_delta_norm > 0.0) {
            problems.push("gate.max_delta_norm must be > 0".to_string());
        }
        if !(self.gate.risk_segment_cap.is_finite() && self.gate.risk_segment_cap > 0.0) {
            problems.push("gate.risk_segment_cap must be > 0".to_string());
        }
        if !(self.eval.max_state_norm.is_finite() && self.eval.max_state_norm > 0.0) {
            problems.push("eval.max_state_norm must be > 0".to_string());
        }
        if !(self.eval.max_segment_norm.is_finite() && self.eval.max_segment_norm > 0.0) {
            problems.push("eval.max_segment_norm must be > 0".to_string());
        }
        if !(self.retrieval.entropy_threshold.is_finite()
            && self.retrieval.entropy_threshold >= 0.0)
        {
            problems.push("retrieval.entropy_threshold must be >= 0".to_string());
        }
        if !(self.retrieval.similarity_threshold.is_finite()
            && (0.0..=1.0).contains(&self.retrieval.similarity_threshold))
        {
            problems.push("retrieval.similarity_threshold must be in [0, 1]".to_string());
        }
        if self.retrieval.max_evidence_len == 0 {
            problems.push("retrieval.max_evidence_len must be > 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AdcError::InvalidConfig {
                details: problems.join("; "),
            })
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

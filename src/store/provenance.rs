//! Append-only provenance rows: one audit record per disposition decision.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What initiated the decision being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// A live interaction turn.
    Interaction,
    /// A replayed recording.
    Replay,
    /// Store initialisation.
    Init,
    /// Operator-driven action (e.g. manual rollback).
    Manual,
}

impl TriggerType {
    /// Stable wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interaction => "interaction",
            Self::Replay => "replay",
            Self::Init => "init",
            Self::Manual => "manual",
        }
    }

    /// Parse the stable wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "interaction" => Some(Self::Interaction),
            "replay" => Some(Self::Replay),
            "init" => Some(Self::Init),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Final decision recorded for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The proposal was committed.
    Commit,
    /// The proposal was rejected (gate veto or evaluator rollback).
    Reject,
    /// The turn produced no state change.
    NoOp,
}

impl Decision {
    /// Stable wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Reject => "reject",
            Self::NoOp => "no_op",
        }
    }

    /// Parse the stable wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "commit" => Some(Self::Commit),
            "reject" => Some(Self::Reject),
            "no_op" => Some(Self::NoOp),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One provenance row.
///
/// Rows are append-only and never updated; the store persists empty text
/// fields as absent and fills `created_at` when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Snapshot the decision refers to.
    pub version_id: String,
    /// Hash of the prompt context, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_hash: Option<String>,
    /// What initiated the decision.
    pub trigger_type: TriggerType,
    /// Signals used to decide, JSON-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals_json: Option<String>,
    /// Evidence identifiers used, JSON-encoded ordered list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_refs: Option<String>,
    /// Final decision.
    pub decision: Decision,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Creation time; auto-filled by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProvenanceEntry {
    /// Minimal entry with only the required fields.
    #[must_use]
    pub fn new(version_id: impl Into<String>, trigger_type: TriggerType, decision: Decision) -> Self {
        Self {
            version_id: version_id.into(),
            context_hash: None,
            trigger_type,
            signals_json: None,
            evidence_refs: None,
            decision,
            reason: None,
            created_at: None,
        }
    }

    /// Attach the sha256 hash of the prompt context.
    #[must_use]
    pub fn with_context(mut self, context: &str) -> Self {
        self.context_hash = Some(context_hash(context));
        self
    }

    /// Attach the reason string.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the serialized signals blob.
    #[must_use]
    pub fn with_signals_json(mut self, signals_json: impl Into<String>) -> Self {
        self.signals_json = Some(signals_json.into());
        self
    }

    /// Attach evidence identifiers as a JSON-encoded ordered list.
    #[must_use]
    pub fn with_evidence_ids(mut self, ids: &[String]) -> Self {
        self.evidence_refs = serde_json::to_string(ids).ok();
        self
    }
}

/// Hex sha256 of a prompt context.
#[must_use]
pub fn context_hash(context: &str) -> String {
    use fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(context.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Normalise an optional text field: empty strings persist as absent.
#[must_use]
pub fn empty_as_null(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

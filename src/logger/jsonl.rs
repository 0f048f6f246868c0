//! JSONL turn log: append-only line-delimited JSON mirroring the provenance
//! log for agent-friendly consumption.
//!
//! Each line is a self-contained JSON object assembled in memory and written
//! atomically via `write_all` so tailing processes never see partial lines.
//!
//! Four-level fallback chain:
//! 1. Primary file path
//! 2. Fallback path (e.g. `/dev/shm/adc.jsonl` for RAM-backed fallback)
//! 3. stderr with `[ADC-JSONL]` prefix
//! 4. Silent discard (the controller must never fail a turn for logging)

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Event types matching the controller's turn model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TurnCommit,
    TurnNoOp,
    GateReject,
    EvalRollback,
    RetrievalSkip,
    StoreInit,
    Error,
}

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A single JSONL entry — all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: EventType,
    /// Severity level.
    pub severity: Severity,
    /// Active snapshot version after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Generation entropy for the turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f32>,
    /// Total delta norm of the proposal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_norm: Option<f64>,
    /// Gate soft score for survivors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_score: Option<f64>,
    /// Evidence records injected this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_count: Option<usize>,
    /// Reason carried from the deciding stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// ADC error code if the event reports a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
            severity,
            version_id: None,
            entropy: None,
            delta_norm: None,
            soft_score: None,
            evidence_count: None,
            reason: None,
            error_code: None,
        }
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Fallback,
    Stderr,
    Discard,
}

/// Append-only JSONL writer with multi-level fallback.
pub struct JsonlWriter {
    primary: PathBuf,
    fallback: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    state: WriterState,
}

impl JsonlWriter {
    /// Open the JSONL log. Falls through the degradation chain on failure.
    pub fn open(primary: PathBuf, fallback: Option<PathBuf>) -> Self {
        let mut w = Self {
            primary,
            fallback,
            writer: None,
            state: WriterState::Discard,
        };
        if let Some(file) = open_append(&w.primary) {
            w.writer = Some(BufWriter::new(file));
            w.state = WriterState::Normal;
        } else {
            w.degrade();
        }
        w
    }

    /// Write a single entry as one atomic JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[ADC-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Flush buffered lines.
    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Current degradation state, for diagnostics.
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Fallback => "fallback",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        match self.state {
            WriterState::Normal | WriterState::Fallback => {
                let failed = match self.writer.as_mut() {
                    Some(w) => w.write_all(line.as_bytes()).is_err(),
                    None => true,
                };
                if failed {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[ADC-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal | WriterState::Discard => {
                if let Some(file) = self.fallback.as_ref().and_then(|p| open_append(p)) {
                    self.writer = Some(BufWriter::new(file));
                    self.state = WriterState::Fallback;
                } else {
                    self.state = WriterState::Stderr;
                }
            }
            WriterState::Fallback => self.state = WriterState::Stderr,
            WriterState::Stderr => self.state = WriterState::Discard,
        }
    }
}

fn open_append(path: &PathBuf) -> Option<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && std::fs::create_dir_all(parent).is_err() {
            return None;
        }
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

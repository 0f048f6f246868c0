//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use adaptive_disposition::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{AdcError, Result};

// State
pub use crate::state::segment::{STATE_DIM, SegmentId, SegmentMap};
pub use crate::state::signals::{Signals, UpdateMetrics};
pub use crate::state::snapshot::StateSnapshot;

// Store
pub use crate::store::provenance::{Decision, ProvenanceEntry, TriggerType};
pub use crate::store::sqlite::DispositionStore;

// Engine
pub use crate::engine::evaluator::{EvalOutcome, evaluate_state};
pub use crate::engine::gate::{GateAction, GateDecision, evaluate_gate};
pub use crate::engine::replay::{Interaction, ReplayConfig, ReplayReport, TurnAction, replay};
pub use crate::engine::update::{ProposalIdentity, UpdateAction, UpdateOutcome, apply_update};

// Retrieval & codec
pub use crate::codec::{Codec, EvidenceRecord, Generation};
pub use crate::retrieval::gate::{RetrievalOutcome, run_retrieval};

// Controller
pub use crate::controller::{Controller, TurnReport};

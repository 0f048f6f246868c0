//! Pure decision pipeline: update, hard-veto gate, evaluator, replay.

pub mod evaluator;
pub mod gate;
pub mod replay;
pub mod update;

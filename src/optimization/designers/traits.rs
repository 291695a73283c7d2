use crate::core::{Candidate, CandidateDatabase, CandidateId, DesignerKind, ParameterSet};
use std::sync::Arc;

/// What a designer decided after seeing a complete batch
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Keep iterating (subject to `max_iters`)
    pub proceed: bool,
    /// Candidates to mark active for later tasks
    pub selection: Option<Vec<CandidateId>>,
}

impl UpdateOutcome {
    pub fn proceed() -> Self {
        Self {
            proceed: true,
            selection: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            proceed: false,
            selection: None,
        }
    }

    /// Final outcome carrying a selection
    pub fn select(candidates: Vec<CandidateId>) -> Self {
        Self {
            proceed: false,
            selection: Some(candidates),
        }
    }
}

/// Search strategy interface - propose a batch, then learn from it
pub trait Strategy {
    fn kind(&self) -> DesignerKind;

    /// Hard iteration limit of one run
    fn max_iters(&self) -> u32;

    /// Number of evaluation jobs allowed in flight at once
    fn max_concurrent(&self) -> usize;

    /// Upper bound on the size of any proposed batch
    fn batch_limit(&self) -> usize;

    /// Propose the next batch of parameter sets. An empty batch means the
    /// designer works on the database alone this iteration.
    fn propose(&mut self, database: &CandidateDatabase, iteration: u32) -> Vec<ParameterSet>;

    /// Observe the fully evaluated batch, in proposal order
    fn update(&mut self, database: &CandidateDatabase, evaluated: &[Arc<Candidate>]) -> UpdateOutcome;
}

// ============================================================================
// GUIDE: ADDING A DESIGNER
// ============================================================================
//
// 1. Add an options struct with `#[serde(deny_unknown_fields)]` and a
//    `validate()` returning the reason string on failure.
//
// 2. Implement `Strategy` for the designer struct. Keep all iteration state
//    inside the struct: the runner owns it exclusively, workers never see it.
//
//    - propose() must never return more than batch_limit() sets, and every
//      value must lie inside its group's declared range (use
//      CircuitSpec::sample / CircuitSpec::assemble).
//    - update() receives every proposed candidate, scored or rejected, in
//      proposal order. Rejected ones have merit() == None; never compare them.
//
// 3. Add a variant to `DesignerKind`, `DesignerConfig` and `Designer` in
//    designers/mod.rs. The match arms are exhaustive, so the compiler points
//    at every place that needs the new variant.
//
// ============================================================================

use super::traits::{Strategy, UpdateOutcome};
use crate::core::{Candidate, CandidateDatabase, DesignerKind, ParameterSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseFilterOptions {
    pub num_circuits: usize,
}

impl DatabaseFilterOptions {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.num_circuits == 0 {
            return Err("num_circuits must be positive".into());
        }
        Ok(())
    }
}

/// Selects the best scored candidates of the whole database as seeds for
/// later tasks. Proposes nothing and runs a single pass.
pub struct DatabaseFilter {
    options: DatabaseFilterOptions,
}

impl DatabaseFilter {
    pub fn new(options: DatabaseFilterOptions) -> Self {
        Self { options }
    }
}

impl Strategy for DatabaseFilter {
    fn kind(&self) -> DesignerKind {
        DesignerKind::DatabaseFilter
    }

    fn max_iters(&self) -> u32 {
        1
    }

    fn max_concurrent(&self) -> usize {
        1
    }

    fn batch_limit(&self) -> usize {
        0
    }

    fn propose(&mut self, _database: &CandidateDatabase, _iteration: u32) -> Vec<ParameterSet> {
        Vec::new()
    }

    fn update(&mut self, database: &CandidateDatabase, _evaluated: &[Arc<Candidate>]) -> UpdateOutcome {
        let best = database.best(self.options.num_circuits);
        if best.len() < self.options.num_circuits {
            warn!(
                requested = self.options.num_circuits,
                available = best.len(),
                "fewer scored candidates than requested, selecting all of them"
            );
        }

        let selected: Vec<_> = best.iter().map(|c| c.id()).collect();
        info!(
            selected = selected.len(),
            best_merit = best.first().and_then(|c| c.merit()),
            "filtered database"
        );
        UpdateOutcome::select(selected)
    }
}

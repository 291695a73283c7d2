use super::traits::{Strategy, UpdateOutcome};
use super::rng_from_seed;
use crate::core::{Candidate, CandidateDatabase, CircuitSpec, DesignerKind, ParameterSet};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomSearchOptions {
    pub max_iters: u32,
    pub max_concurrent: usize,
    pub batch_size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RandomSearchOptions {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_iters == 0 {
            return Err("max_iters must be positive".into());
        }
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be positive".into());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be positive".into());
        }
        Ok(())
    }
}

/// Uniform sampling of the declared ranges, blind to history
pub struct RandomSearch {
    options: RandomSearchOptions,
    circuit: Arc<CircuitSpec>,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(options: RandomSearchOptions, circuit: Arc<CircuitSpec>) -> Self {
        let rng = rng_from_seed(options.seed);
        Self { options, circuit, rng }
    }
}

impl Strategy for RandomSearch {
    fn kind(&self) -> DesignerKind {
        DesignerKind::RandomSearch
    }

    fn max_iters(&self) -> u32 {
        self.options.max_iters
    }

    fn max_concurrent(&self) -> usize {
        self.options.max_concurrent
    }

    fn batch_limit(&self) -> usize {
        self.options.batch_size
    }

    fn propose(&mut self, _database: &CandidateDatabase, _iteration: u32) -> Vec<ParameterSet> {
        (0..self.options.batch_size)
            .map(|_| self.circuit.sample(&mut self.rng))
            .collect()
    }

    fn update(&mut self, _database: &CandidateDatabase, _evaluated: &[Arc<Candidate>]) -> UpdateOutcome {
        UpdateOutcome::proceed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentKind, GroupSpec};

    #[test]
    fn test_batches_are_full_and_in_range() {
        let circuit = Arc::new(
            CircuitSpec::new()
                .with_group("c", GroupSpec::range(ComponentKind::Capacitor, 6, 1.0, 100.0))
                .with_group("j", GroupSpec::range(ComponentKind::Junction, 6, 99.0, 1982.0)),
        );
        let options = RandomSearchOptions {
            max_iters: 3,
            max_concurrent: 2,
            batch_size: 10,
            seed: Some(1),
        };
        let mut designer = RandomSearch::new(options, circuit.clone());
        let db = CandidateDatabase::in_memory();
        for iteration in 0..3 {
            let batch = designer.propose(&db, iteration);
            assert_eq!(batch.len(), 10);
            assert!(batch.iter().all(|p| circuit.contains(p)));
            assert!(designer.update(&db, &[]).proceed);
        }
    }

    #[test]
    fn test_seed_makes_proposals_reproducible() {
        let circuit = Arc::new(CircuitSpec::new().with_group("l", GroupSpec::range(ComponentKind::Inductor, 3, 75.0, 300.0)));
        let options = RandomSearchOptions {
            max_iters: 1,
            max_concurrent: 1,
            batch_size: 4,
            seed: Some(42),
        };
        let db = CandidateDatabase::in_memory();
        let a = RandomSearch::new(options.clone(), circuit.clone()).propose(&db, 0);
        let b = RandomSearch::new(options, circuit).propose(&db, 0);
        assert_eq!(a, b);
    }
}

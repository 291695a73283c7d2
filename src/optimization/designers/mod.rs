mod filter;
mod particle;
mod random;
pub mod traits;

pub use filter::{DatabaseFilter, DatabaseFilterOptions};
pub use particle::{ParticleSwarm, ParticleSwarmOptions};
pub use random::{RandomSearch, RandomSearchOptions};
pub use traits::{Strategy, UpdateOutcome};

use crate::core::{Candidate, CandidateDatabase, CircuitSpec, DesignerKind, ParameterSet};
use crate::error::ConfigurationError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub(crate) fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn parse_options<T: DeserializeOwned>(options: &Value, task: &str) -> Result<T, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidDesignerOptions {
        task: task.to_string(),
        reason,
    };
    if !options.is_object() {
        return Err(invalid("designer options must be a JSON object".into()));
    }
    serde_json::from_value(options.clone()).map_err(|e| invalid(e.to_string()))
}

/// Validated designer options of one task. Cheap to clone; every run builds
/// a fresh `Designer` from it so re-executing a pipeline starts clean.
#[derive(Clone, Debug, PartialEq)]
pub enum DesignerConfig {
    RandomSearch(RandomSearchOptions),
    ParticleSwarm(ParticleSwarmOptions),
    DatabaseFilter(DatabaseFilterOptions),
}

impl DesignerConfig {
    pub fn from_options(kind: DesignerKind, options: &Value, task: &str) -> Result<Self, ConfigurationError> {
        let config = match kind {
            DesignerKind::RandomSearch => Self::RandomSearch(parse_options(options, task)?),
            DesignerKind::ParticleSwarm => Self::ParticleSwarm(parse_options(options, task)?),
            DesignerKind::DatabaseFilter => Self::DatabaseFilter(parse_options(options, task)?),
        };

        let checked = match &config {
            Self::RandomSearch(o) => o.validate(),
            Self::ParticleSwarm(o) => o.validate(),
            Self::DatabaseFilter(o) => o.validate(),
        };
        checked.map_err(|reason| ConfigurationError::InvalidDesignerOptions {
            task: task.to_string(),
            reason,
        })?;
        Ok(config)
    }

    pub fn kind(&self) -> DesignerKind {
        match self {
            Self::RandomSearch(_) => DesignerKind::RandomSearch,
            Self::ParticleSwarm(_) => DesignerKind::ParticleSwarm,
            Self::DatabaseFilter(_) => DesignerKind::DatabaseFilter,
        }
    }

    /// One line summary for logs
    pub fn describe(&self) -> String {
        match self {
            Self::RandomSearch(o) => format!(
                "random search ({} x {} candidates, {} workers)",
                o.max_iters, o.batch_size, o.max_concurrent
            ),
            Self::ParticleSwarm(o) => format!(
                "particle swarm ({} particles, {} iterations, w={}, c1={}, c2={})",
                o.n_particles, o.max_iters, o.inertia, o.cognitive, o.social
            ),
            Self::DatabaseFilter(o) => format!("database filter (best {})", o.num_circuits),
        }
    }

    pub fn build(&self, circuit: Arc<CircuitSpec>) -> Designer {
        match self {
            Self::RandomSearch(o) => Designer::RandomSearch(RandomSearch::new(o.clone(), circuit)),
            Self::ParticleSwarm(o) => Designer::ParticleSwarm(ParticleSwarm::new(o.clone(), circuit)),
            Self::DatabaseFilter(o) => Designer::DatabaseFilter(DatabaseFilter::new(o.clone())),
        }
    }
}

/// Closed set of designers, dispatched statically.
pub enum Designer {
    RandomSearch(RandomSearch),
    ParticleSwarm(ParticleSwarm),
    DatabaseFilter(DatabaseFilter),
}

impl Designer {
    fn strategy(&self) -> &dyn Strategy {
        match self {
            Self::RandomSearch(d) => d,
            Self::ParticleSwarm(d) => d,
            Self::DatabaseFilter(d) => d,
        }
    }

    fn strategy_mut(&mut self) -> &mut dyn Strategy {
        match self {
            Self::RandomSearch(d) => d,
            Self::ParticleSwarm(d) => d,
            Self::DatabaseFilter(d) => d,
        }
    }
}

impl Strategy for Designer {
    fn kind(&self) -> DesignerKind {
        self.strategy().kind()
    }

    fn max_iters(&self) -> u32 {
        self.strategy().max_iters()
    }

    fn max_concurrent(&self) -> usize {
        self.strategy().max_concurrent()
    }

    fn batch_limit(&self) -> usize {
        self.strategy().batch_limit()
    }

    fn propose(&mut self, database: &CandidateDatabase, iteration: u32) -> Vec<ParameterSet> {
        let mut batch = self.strategy_mut().propose(database, iteration);
        batch.truncate(self.batch_limit());
        batch
    }

    fn update(&mut self, database: &CandidateDatabase, evaluated: &[Arc<Candidate>]) -> UpdateOutcome {
        self.strategy_mut().update(database, evaluated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentKind, GroupSpec};
    use serde_json::json;

    fn circuit() -> Arc<CircuitSpec> {
        Arc::new(CircuitSpec::new().with_group("c", GroupSpec::range(ComponentKind::Capacitor, 6, 1.0, 100.0)))
    }

    #[test]
    fn test_parse_each_designer() {
        let random = DesignerConfig::from_options(
            DesignerKind::RandomSearch,
            &json!({"max_iters": 3, "max_concurrent": 2, "batch_size": 10}),
            "random",
        )
        .unwrap();
        assert_eq!(random.kind(), DesignerKind::RandomSearch);

        let swarm = DesignerConfig::from_options(
            DesignerKind::ParticleSwarm,
            &json!({"max_iters": 2, "max_concurrent": 2, "n_particles": 2}),
            "pso",
        )
        .unwrap();
        match swarm {
            DesignerConfig::ParticleSwarm(o) => {
                assert_eq!(o.inertia, 0.7);
                assert_eq!(o.max_concurrent, 2);
                assert_eq!(o.convergence, None);
            }
            other => panic!("unexpected config {:?}", other),
        }

        let filter =
            DesignerConfig::from_options(DesignerKind::DatabaseFilter, &json!({"num_circuits": 2}), "filter").unwrap();
        assert_eq!(filter.build(circuit()).max_iters(), 1);
    }

    #[test]
    fn test_malformed_options_are_rejected() {
        let cases = [
            (DesignerKind::RandomSearch, json!({"max_iters": 3, "batch_size": 10})),
            (DesignerKind::RandomSearch, json!({"max_iters": 0, "max_concurrent": 1, "batch_size": 1})),
            (DesignerKind::RandomSearch, json!({"max_iters": 1, "max_concurrent": 1, "batch_size": 1, "temp": 4})),
            (DesignerKind::ParticleSwarm, json!({"max_iters": 2})),
            (DesignerKind::DatabaseFilter, json!({"num_circuits": -1})),
            (DesignerKind::DatabaseFilter, json!([2])),
        ];
        for (kind, options) in cases {
            let err = DesignerConfig::from_options(kind, &options, "bad").unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidDesignerOptions { ref task, .. } if task == "bad"),
                "{:?} accepted {}",
                kind,
                options
            );
        }
    }

    #[test]
    fn test_designer_dispatch_respects_batch_limit() {
        let config = DesignerConfig::from_options(
            DesignerKind::RandomSearch,
            &json!({"max_iters": 1, "max_concurrent": 1, "batch_size": 4, "seed": 9}),
            "random",
        )
        .unwrap();
        let mut designer = config.build(circuit());
        let db = CandidateDatabase::in_memory();
        assert_eq!(designer.kind(), DesignerKind::RandomSearch);
        assert_eq!(designer.propose(&db, 0).len(), 4);
    }
}

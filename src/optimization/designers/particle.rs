use super::rng_from_seed;
use super::traits::{Strategy, UpdateOutcome};
use crate::core::{Candidate, CandidateDatabase, CircuitSpec, DesignerKind, ParameterSet};
use crate::utils::variance;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

fn default_inertia() -> f64 {
    0.7
}

fn default_acceleration() -> f64 {
    1.5
}

fn default_velocity_clamp() -> f64 {
    0.2
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParticleSwarmOptions {
    pub max_iters: u32,
    pub n_particles: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// w - velocity inertia weight
    #[serde(default = "default_inertia")]
    pub inertia: f64,
    /// c1 - personal best influence
    #[serde(default = "default_acceleration")]
    pub cognitive: f64,
    /// c2 - global best influence
    #[serde(default = "default_acceleration")]
    pub social: f64,
    /// Max velocity as a fraction of each parameter's range
    #[serde(default = "default_velocity_clamp")]
    pub velocity_clamp: f64,
    /// Stop once the variance of an iteration's merits drops below this
    #[serde(default)]
    pub convergence: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ParticleSwarmOptions {
    pub fn new(max_iters: u32, n_particles: usize) -> Self {
        Self {
            max_iters,
            n_particles,
            max_concurrent: default_max_concurrent(),
            inertia: default_inertia(),
            cognitive: default_acceleration(),
            social: default_acceleration(),
            velocity_clamp: default_velocity_clamp(),
            convergence: None,
            seed: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_iters == 0 {
            return Err("max_iters must be positive".into());
        }
        if self.n_particles == 0 {
            return Err("n_particles must be positive".into());
        }
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be positive".into());
        }
        for (name, value) in [
            ("inertia", self.inertia),
            ("cognitive", self.cognitive),
            ("social", self.social),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        if !self.velocity_clamp.is_finite() || self.velocity_clamp <= 0.0 {
            return Err("velocity_clamp must be positive".into());
        }
        if let Some(eps) = self.convergence {
            if !eps.is_finite() || eps <= 0.0 {
                return Err("convergence must be positive".into());
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Particle {
    /// Continuous position; discrete groups are snapped only when proposing
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_merit: f64,
}

/// Particle Swarm Optimization over the flattened parameter vector.
///
/// The swarm is built lazily on the first proposal so it can start from the
/// database's active selection left behind by an earlier filter task.
pub struct ParticleSwarm {
    options: ParticleSwarmOptions,
    circuit: Arc<CircuitSpec>,
    bounds: Vec<(f64, f64)>,
    rng: StdRng,
    particles: Vec<Particle>,
    global_best: Option<(Vec<f64>, f64)>,
}

impl ParticleSwarm {
    pub fn new(options: ParticleSwarmOptions, circuit: Arc<CircuitSpec>) -> Self {
        let rng = rng_from_seed(options.seed);
        let bounds = circuit.bounds();
        Self {
            options,
            circuit,
            bounds,
            rng,
            particles: Vec::new(),
            global_best: None,
        }
    }

    /// Best merit seen by the swarm so far
    pub fn global_best_merit(&self) -> Option<f64> {
        self.global_best.as_ref().map(|(_, merit)| *merit)
    }

    fn random_position(&mut self) -> Vec<f64> {
        let mut position: Vec<f64> = self
            .bounds
            .iter()
            .map(|&(min, max)| self.rng.gen_range(min..=max))
            .collect();
        self.circuit.project(&mut position);
        position
    }

    /// Initialize velocities to a small fraction of each parameter range
    fn random_velocity(&mut self) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|&(min, max)| {
                let range = max - min;
                self.rng.gen_range(-range * 0.1..=range * 0.1)
            })
            .collect()
    }

    fn initialize(&mut self, database: &CandidateDatabase) {
        let seeds: Vec<(Vec<f64>, Option<f64>)> = database
            .active()
            .iter()
            .filter_map(|c| self.circuit.flatten(c.parameters()).map(|p| (p, c.merit())))
            .take(self.options.n_particles)
            .collect();
        let seeded = seeds.len();

        for (position, merit) in seeds {
            let velocity = self.random_velocity();
            let best_merit = merit.unwrap_or(f64::INFINITY);
            self.record_global(&position, best_merit);
            self.particles.push(Particle {
                best_position: position.clone(),
                position,
                velocity,
                best_merit,
            });
        }

        while self.particles.len() < self.options.n_particles {
            let position = self.random_position();
            let velocity = self.random_velocity();
            self.particles.push(Particle {
                best_position: position.clone(),
                position,
                velocity,
                best_merit: f64::INFINITY,
            });
        }

        debug!(
            particles = self.particles.len(),
            seeded,
            "initialized swarm"
        );

        // seeds are already evaluated; move them before their first proposal
        if seeded > 0 {
            self.advance(0..seeded);
        }
    }

    fn record_global(&mut self, position: &[f64], merit: f64) {
        if !merit.is_finite() {
            return;
        }
        let improved = self
            .global_best
            .as_ref()
            .is_none_or(|(_, best)| merit < *best);
        if improved {
            self.global_best = Some((position.to_vec(), merit));
        }
    }

    /// Apply the velocity/position update to the given particles
    fn advance(&mut self, range: std::ops::Range<usize>) {
        let Self {
            options,
            bounds,
            rng,
            particles,
            global_best,
            ..
        } = self;

        for particle in &mut particles[range] {
            let attractor = global_best
                .as_ref()
                .map_or(&particle.best_position, |(position, _)| position);

            for (i, &(min, max)) in bounds.iter().enumerate() {
                let r1: f64 = rng.gen_range(0.0..1.0);
                let r2: f64 = rng.gen_range(0.0..1.0);

                let velocity = options.inertia * particle.velocity[i]
                    + options.cognitive * r1 * (particle.best_position[i] - particle.position[i])
                    + options.social * r2 * (attractor[i] - particle.position[i]);

                let v_max = (max - min) * options.velocity_clamp;
                particle.velocity[i] = velocity.clamp(-v_max, v_max);
                particle.position[i] = (particle.position[i] + particle.velocity[i]).clamp(min, max);
            }
        }
    }
}

impl Strategy for ParticleSwarm {
    fn kind(&self) -> DesignerKind {
        DesignerKind::ParticleSwarm
    }

    fn max_iters(&self) -> u32 {
        self.options.max_iters
    }

    fn max_concurrent(&self) -> usize {
        self.options.max_concurrent
    }

    fn batch_limit(&self) -> usize {
        self.options.n_particles
    }

    fn propose(&mut self, database: &CandidateDatabase, _iteration: u32) -> Vec<ParameterSet> {
        if self.particles.is_empty() {
            self.initialize(database);
        }
        self.particles
            .iter()
            .map(|p| self.circuit.assemble(&p.position))
            .collect()
    }

    fn update(&mut self, _database: &CandidateDatabase, evaluated: &[Arc<Candidate>]) -> UpdateOutcome {
        let mut merits = Vec::with_capacity(evaluated.len());

        for index in 0..self.particles.len().min(evaluated.len()) {
            // rejected particles keep their previous bests
            let Some(merit) = evaluated[index].merit() else {
                continue;
            };
            merits.push(merit);

            // bests remember the snapped position that was actually simulated
            let evaluated_position = self
                .circuit
                .flatten(evaluated[index].parameters())
                .unwrap_or_else(|| {
                    let mut snapped = self.particles[index].position.clone();
                    self.circuit.project(&mut snapped);
                    snapped
                });

            let particle = &mut self.particles[index];
            if merit < particle.best_merit {
                particle.best_merit = merit;
                particle.best_position.clone_from(&evaluated_position);
            }
            self.record_global(&evaluated_position, merit);
        }

        if let (Some(eps), Some(spread)) = (self.options.convergence, variance(&merits)) {
            if spread < eps {
                debug!(variance = spread, threshold = eps, "swarm converged");
                return UpdateOutcome::stop();
            }
        }

        self.advance(0..self.particles.len());
        UpdateOutcome::proceed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        CandidateId, ComponentKind, GroupSpec, NewCandidate, Outcome, Provenance, RejectionKind,
    };

    fn circuit() -> Arc<CircuitSpec> {
        Arc::new(
            CircuitSpec::new()
                .with_group("l", GroupSpec::range(ComponentKind::Inductor, 3, 75.0, 300.0))
                .with_group("phi", GroupSpec::discrete(ComponentKind::PhaseOffset, 2, vec![0.0, 0.5])),
        )
    }

    fn record(db: &CandidateDatabase, parameters: ParameterSet, outcome: Outcome) -> Arc<Candidate> {
        let id = db.append(NewCandidate {
            parameters,
            outcome,
            provenance: Provenance {
                task: "pso".into(),
                designer: DesignerKind::ParticleSwarm,
                iteration: 0,
                slot: 0,
            },
        });
        db.get(id).unwrap()
    }

    // merit = distance of the first inductor from 200
    fn score(parameters: &ParameterSet) -> f64 {
        (parameters.get("l").unwrap()[0] - 200.0).abs()
    }

    #[test]
    fn test_positions_stay_in_range_across_iterations() {
        let spec = circuit();
        let mut options = ParticleSwarmOptions::new(50, 6);
        options.seed = Some(3);
        options.inertia = 1.2;
        options.velocity_clamp = 1.0;
        let mut swarm = ParticleSwarm::new(options, spec.clone());
        let db = CandidateDatabase::in_memory();

        for iteration in 0..50 {
            let batch = swarm.propose(&db, iteration);
            assert_eq!(batch.len(), 6);
            for params in &batch {
                assert!(spec.contains(params), "out of range: {:?}", params);
                assert!(params.get("phi").unwrap().iter().all(|v| *v == 0.0 || *v == 0.5));
            }
            let evaluated: Vec<_> = batch
                .into_iter()
                .map(|p| {
                    let merit = score(&p);
                    record(&db, p, Outcome::scored(merit, None))
                })
                .collect();
            swarm.update(&db, &evaluated);
        }
    }

    #[test]
    fn test_swarm_improves_global_best() {
        let mut options = ParticleSwarmOptions::new(30, 8);
        options.seed = Some(11);
        let mut swarm = ParticleSwarm::new(options, circuit());
        let db = CandidateDatabase::in_memory();

        let mut first = None;
        for iteration in 0..30 {
            let evaluated: Vec<_> = swarm
                .propose(&db, iteration)
                .into_iter()
                .map(|p| {
                    let merit = score(&p);
                    record(&db, p, Outcome::scored(merit, None))
                })
                .collect();
            swarm.update(&db, &evaluated);
            first.get_or_insert(swarm.global_best_merit().unwrap());
        }
        let last = swarm.global_best_merit().unwrap();
        assert!(last <= first.unwrap());
        assert!(last < 10.0, "global best {}", last);
    }

    #[test]
    fn test_seeds_from_active_selection() {
        let spec = circuit();
        let db = CandidateDatabase::in_memory();
        let seed_params = spec.assemble(&[190.0, 100.0, 100.0, 0.0, 0.5]);
        let seed = record(&db, seed_params, Outcome::scored(10.0, None));
        db.mark_active("filter", vec![seed.id()]);

        let mut options = ParticleSwarmOptions::new(2, 3);
        options.seed = Some(5);
        let mut swarm = ParticleSwarm::new(options, spec);
        let batch = swarm.propose(&db, 0);

        assert_eq!(batch.len(), 3);
        assert_eq!(swarm.global_best_merit(), Some(10.0));
    }

    #[test]
    fn test_rejected_particles_do_not_update_bests() {
        let db = CandidateDatabase::in_memory();
        let mut options = ParticleSwarmOptions::new(3, 2);
        options.seed = Some(8);
        let mut swarm = ParticleSwarm::new(options, circuit());

        let evaluated: Vec<_> = swarm
            .propose(&db, 0)
            .into_iter()
            .map(|p| record(&db, p, Outcome::rejected(RejectionKind::Simulation, "timeout")))
            .collect();
        assert!(swarm.update(&db, &evaluated).proceed);
        assert_eq!(swarm.global_best_merit(), None);
        assert_eq!(db.get(CandidateId(0)).unwrap().merit(), None);
    }

    #[test]
    fn test_convergence_stops_early() {
        let db = CandidateDatabase::in_memory();
        let mut options = ParticleSwarmOptions::new(10, 4);
        options.convergence = Some(1e-6);
        options.seed = Some(2);
        let mut swarm = ParticleSwarm::new(options, circuit());

        let evaluated: Vec<_> = swarm
            .propose(&db, 0)
            .into_iter()
            .map(|p| record(&db, p, Outcome::scored(1.0, None)))
            .collect();
        assert!(!swarm.update(&db, &evaluated).proceed);
    }

    // merit = distance of every phase offset from 0.5
    fn phase_score(parameters: &ParameterSet) -> f64 {
        parameters.get("phi").unwrap().iter().map(|v| (v - 0.5).abs()).sum()
    }

    #[test]
    fn test_discrete_groups_move_toward_global_best() {
        let spec = circuit();
        let db = CandidateDatabase::in_memory();
        let seed = record(
            &db,
            spec.assemble(&[200.0, 200.0, 200.0, 0.5, 0.5]),
            Outcome::scored(0.0, None),
        );
        db.mark_active("filter", vec![seed.id()]);

        let mut options = ParticleSwarmOptions::new(40, 3);
        options.seed = Some(4);
        let mut swarm = ParticleSwarm::new(options, spec.clone());
        swarm.propose(&db, 0);

        // unseeded particles start on the opposite phase
        for particle in &mut swarm.particles[1..] {
            particle.position[3] = 0.0;
            particle.position[4] = 0.0;
            particle.best_position.clone_from(&particle.position);
            particle.best_merit = f64::INFINITY;
        }

        let mut moved = false;
        for iteration in 0..40 {
            let batch = swarm.propose(&db, iteration);
            moved |= batch[1..]
                .iter()
                .any(|p| p.get("phi").unwrap().contains(&0.5));
            let evaluated: Vec<_> = batch
                .into_iter()
                .map(|p| {
                    let merit = phase_score(&p);
                    record(&db, p, Outcome::scored(merit, None))
                })
                .collect();
            swarm.update(&db, &evaluated);
        }

        assert!(moved, "no particle left its initial phase");
        let (best_position, _) = swarm.global_best.clone().unwrap();
        assert!(best_position[3..].iter().all(|v| *v == 0.0 || *v == 0.5));
        for particle in &swarm.particles {
            assert!(particle.best_position[3..].iter().all(|v| *v == 0.0 || *v == 0.5));
        }
    }

    #[test]
    fn test_option_validation() {
        let mut options = ParticleSwarmOptions::new(2, 2);
        assert!(options.validate().is_ok());
        options.velocity_clamp = 0.0;
        assert!(options.validate().is_err());
        options.velocity_clamp = 0.2;
        options.convergence = Some(-1.0);
        assert!(options.validate().is_err());
        assert!(ParticleSwarmOptions::new(2, 0).validate().is_err());
    }
}

use super::merit::Merit;
use crate::core::{CircuitSpec, Outcome, ParameterSet, RejectionKind};
use crate::simulation::{NetlistRenderer, Simulator};
use std::sync::Arc;
use tracing::debug;

/// One unit of concurrent work: turn a parameter set into an outcome.
///
/// Never fails; every failure mode becomes a rejected outcome.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, parameters: &ParameterSet) -> Outcome;
}

/// Render, simulate, then score.
pub struct SimulationEvaluator {
    circuit: Arc<CircuitSpec>,
    renderer: Arc<dyn NetlistRenderer>,
    simulator: Arc<dyn Simulator>,
    merit: Merit,
}

impl SimulationEvaluator {
    pub fn new(
        circuit: Arc<CircuitSpec>,
        renderer: Arc<dyn NetlistRenderer>,
        simulator: Arc<dyn Simulator>,
        merit: Merit,
    ) -> Self {
        Self {
            circuit,
            renderer,
            simulator,
            merit,
        }
    }
}

impl Evaluate for SimulationEvaluator {
    fn evaluate(&self, parameters: &ParameterSet) -> Outcome {
        let netlist = self.renderer.render(&self.circuit, parameters);

        let output = match self.simulator.simulate(&netlist) {
            Ok(output) => Arc::new(output),
            Err(e) => {
                debug!(simulator = self.simulator.name(), error = %e, "simulation failed");
                return Outcome::rejected(RejectionKind::Simulation, e.to_string());
            }
        };

        match self.merit.evaluate(&output) {
            Ok(merit) if merit.is_finite() => Outcome::scored(merit, Some(output)),
            Ok(merit) => Outcome::rejected(RejectionKind::Merit, format!("non-finite merit {}", merit))
                .with_simulation_result(output),
            Err(e) => Outcome::rejected(RejectionKind::Merit, e.0).with_simulation_result(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentKind, Evaluation, GroupSpec};
    use crate::error::SimulationError;
    use crate::optimization::merit::{DoubleWell, DoubleWellOptions};
    use crate::simulation::{SimulationOutput, SpiceRenderer};
    use std::time::Duration;

    struct Fixed(Option<SimulationOutput>);

    impl Simulator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn simulate(&self, _netlist: &str) -> Result<SimulationOutput, SimulationError> {
            self.0.clone().ok_or(SimulationError::Timeout(Duration::from_secs(1)))
        }
    }

    fn evaluator(output: Option<SimulationOutput>) -> SimulationEvaluator {
        let circuit = Arc::new(CircuitSpec::new().with_group("c", GroupSpec::range(ComponentKind::Capacitor, 1, 1.0, 2.0)));
        SimulationEvaluator::new(
            circuit,
            Arc::new(SpiceRenderer::default()),
            Arc::new(Fixed(output)),
            Merit::DoubleWell(DoubleWell::new(DoubleWellOptions::default())),
        )
    }

    fn params() -> ParameterSet {
        [("c".to_string(), vec![1.5])].into_iter().collect()
    }

    #[test]
    fn test_symmetric_double_well_is_scored() {
        let x: Vec<f64> = (0..=320).map(|i| -1.6 + i as f64 * 0.01).collect();
        let y: Vec<f64> = x.iter().map(|x| (x * x - 1.0).powi(2)).collect();
        let output = SimulationOutput::new().with_column("phi", x).with_column("energy", y);

        let outcome = evaluator(Some(output)).evaluate(&params());
        assert!(outcome.evaluation.merit().is_some());
        assert!(outcome.simulation_result.is_some());
    }

    #[test]
    fn test_simulator_failure_is_rejected() {
        let outcome = evaluator(None).evaluate(&params());
        assert!(matches!(
            outcome.evaluation,
            Evaluation::Rejected {
                kind: RejectionKind::Simulation,
                ..
            }
        ));
        assert!(outcome.simulation_result.is_none());
    }

    #[test]
    fn test_flat_trace_is_rejected_by_merit() {
        let output = SimulationOutput::new()
            .with_column("t", vec![0.0, 1.0, 2.0, 3.0])
            .with_column("p", vec![1.0; 4]);
        let outcome = evaluator(Some(output)).evaluate(&params());
        assert!(matches!(
            outcome.evaluation,
            Evaluation::Rejected {
                kind: RejectionKind::Merit,
                ..
            }
        ));
        assert!(outcome.simulation_result.is_some());
    }
}

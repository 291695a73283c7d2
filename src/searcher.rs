use crate::core::{CandidateDatabase, CircuitSpec, SearchConfig, TaskSpec};
use crate::error::{ConfigurationError, Result};
use crate::optimization::{
    Evaluate, ProgressTracker, SearchCallback, SimulationEvaluator, Task, TaskReport, TaskRunner,
};
use crate::simulation::{JosimSimulator, NetlistRenderer, SimulationSettings, Simulator, SpiceRenderer};
use crate::utils::format_duration;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of one pipeline execution
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub tasks: Vec<TaskReport>,
    /// Database size after the last task
    pub total_candidates: usize,
    pub elapsed: Duration,
}

/// Ordered pipeline of search tasks sharing one candidate database.
pub struct CircuitSearcher {
    circuit: Arc<CircuitSpec>,
    database: Arc<CandidateDatabase>,
    renderer: Arc<dyn NetlistRenderer>,
    simulator: Arc<dyn Simulator>,
    tasks: Vec<Task>,
}

impl CircuitSearcher {
    /// Create a searcher using JoSIM with default settings
    pub fn new(circuit: CircuitSpec, database: Arc<CandidateDatabase>) -> Result<Self> {
        circuit.validate()?;
        let settings = SimulationSettings::default();
        Ok(Self {
            circuit: Arc::new(circuit),
            database,
            renderer: Arc::new(SpiceRenderer::new(&settings)),
            simulator: Arc::new(JosimSimulator::from_settings(&settings)),
            tasks: Vec::new(),
        })
    }

    /// Build the whole pipeline from a loaded configuration
    pub fn from_config(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let database = match &config.database_path {
            Some(path) => CandidateDatabase::open(path)?,
            None => CandidateDatabase::in_memory(),
        };

        let mut searcher = Self::new(config.circuit, Arc::new(database))?.with_settings(&config.simulation)?;
        for task in config.tasks {
            searcher.add_task(task)?;
        }
        Ok(searcher)
    }

    /// Use JoSIM and the SPICE renderer configured by `settings`
    pub fn with_settings(mut self, settings: &SimulationSettings) -> Result<Self> {
        settings.validate()?;
        self.renderer = Arc::new(SpiceRenderer::new(settings));
        self.simulator = Arc::new(JosimSimulator::from_settings(settings));
        Ok(self)
    }

    pub fn with_simulator(mut self, simulator: Arc<dyn Simulator>) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn NetlistRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Validate and append a task. Nothing is simulated here.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<&Task> {
        if self.tasks.iter().any(|t| t.name() == spec.name) {
            return Err(ConfigurationError::DuplicateTask(spec.name).into());
        }
        let task = Task::from_spec(&spec)?;
        info!(task = task.name(), "added task: {}", task.designer().describe());
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn circuit(&self) -> &CircuitSpec {
        &self.circuit
    }

    pub fn database(&self) -> &Arc<CandidateDatabase> {
        &self.database
    }

    pub fn execute(&self) -> Result<PipelineReport> {
        let mut tracker = ProgressTracker::default();
        self.execute_with(&mut tracker)
    }

    /// Run every task in declared order, reporting progress to `callback`.
    ///
    /// Each run builds fresh designers, so executing twice appends a second
    /// full history to the same database.
    pub fn execute_with(&self, callback: &mut dyn SearchCallback) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(self.tasks.len());

        info!(
            tasks = self.tasks.len(),
            parameters = self.circuit.num_params(),
            simulator = self.simulator.name(),
            "starting circuit search"
        );

        for task in &self.tasks {
            let mut designer = task.designer().build(self.circuit.clone());
            let evaluator = task.merit().map(|merit| {
                SimulationEvaluator::new(
                    self.circuit.clone(),
                    self.renderer.clone(),
                    self.simulator.clone(),
                    merit.clone(),
                )
            });

            let runner = TaskRunner::new(
                task.name(),
                &self.database,
                evaluator.as_ref().map(|e| e as &dyn Evaluate),
            );
            let report = runner.run(&mut designer, callback)?;
            callback.on_task_finished(&report);

            let interrupted = callback.should_stop();
            reports.push(report);
            if interrupted {
                break;
            }
        }

        let report = PipelineReport {
            tasks: reports,
            total_candidates: self.database.len(),
            elapsed: start.elapsed(),
        };
        info!(
            candidates = report.total_candidates,
            elapsed = %format_duration(report.elapsed),
            "circuit search complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentKind, GroupSpec};
    use crate::error::Error;
    use serde_json::json;

    fn circuit() -> CircuitSpec {
        CircuitSpec::new().with_group("c", GroupSpec::range(ComponentKind::Capacitor, 2, 1.0, 100.0))
    }

    #[test]
    fn test_add_task_validates_immediately() {
        let mut searcher = CircuitSearcher::new(circuit(), Arc::new(CandidateDatabase::in_memory())).unwrap();
        searcher
            .add_task(TaskSpec::new("filter", "filter_db", json!({"num_circuits": 2})))
            .unwrap();

        let duplicate = searcher.add_task(TaskSpec::new("filter", "filter_db", json!({"num_circuits": 1})));
        assert!(matches!(
            duplicate,
            Err(Error::Configuration(ConfigurationError::DuplicateTask(_)))
        ));

        let unknown = searcher.add_task(TaskSpec::new("anneal", "annealing", json!({})));
        assert!(matches!(
            unknown,
            Err(Error::Configuration(ConfigurationError::UnknownDesigner(_)))
        ));
        assert_eq!(searcher.tasks().len(), 1);
        assert!(searcher.database().is_empty());
    }

    #[test]
    fn test_invalid_circuit_is_rejected() {
        let result = CircuitSearcher::new(CircuitSpec::new(), Arc::new(CandidateDatabase::in_memory()));
        assert!(matches!(
            result,
            Err(Error::Configuration(ConfigurationError::InvalidCircuit(_)))
        ));
    }

    #[test]
    fn test_bad_settings_are_rejected() {
        let settings = SimulationSettings {
            timeout_secs: 0,
            ..SimulationSettings::default()
        };
        let result = CircuitSearcher::new(circuit(), Arc::new(CandidateDatabase::in_memory()))
            .unwrap()
            .with_settings(&settings);
        assert!(result.is_err());
    }

    #[derive(Default)]
    struct FinishedTasks {
        names: Vec<String>,
    }

    impl SearchCallback for FinishedTasks {
        fn on_iteration(&mut self, _summary: &crate::optimization::IterationSummary<'_>) {}

        fn on_task_finished(&mut self, report: &TaskReport) {
            self.names.push(report.task.clone());
        }
    }

    #[test]
    fn test_each_finished_task_is_reported_once() {
        let mut searcher = CircuitSearcher::new(circuit(), Arc::new(CandidateDatabase::in_memory())).unwrap();
        searcher
            .add_task(TaskSpec::new("first", "filter_db", json!({"num_circuits": 1})))
            .unwrap();
        searcher
            .add_task(TaskSpec::new("second", "filter_db", json!({"num_circuits": 1})))
            .unwrap();

        let mut finished = FinishedTasks::default();
        searcher.execute_with(&mut finished).unwrap();
        assert_eq!(finished.names, vec!["first", "second"]);
    }

    #[test]
    fn test_filter_on_empty_database_selects_nothing() {
        let mut searcher = CircuitSearcher::new(circuit(), Arc::new(CandidateDatabase::in_memory())).unwrap();
        searcher
            .add_task(TaskSpec::new("filter", "filter_db", json!({"num_circuits": 2})))
            .unwrap();
        let report = searcher.execute().unwrap();
        assert_eq!(report.total_candidates, 0);
        assert!(report.tasks[0].selected.is_empty());
    }
}

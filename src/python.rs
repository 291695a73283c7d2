use crate::core::{CandidateDatabase, CircuitSpec, TaskSpec};
use crate::error::Error;
use crate::optimization::{IterationSummary, ProgressTracker, SearchCallback, TaskReport};
use crate::searcher::CircuitSearcher;
use crate::simulation::SimulationSettings;
use pyo3::exceptions::{PyIOError, PyKeyboardInterrupt, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::Configuration(e) => PyValueError::new_err(e.to_string()),
        Error::Io(e) => PyIOError::new_err(e.to_string()),
        Error::Serialization(e) => PyValueError::new_err(e.to_string()),
        Error::WorkerPool(e) => PyRuntimeError::new_err(e),
    }
}

fn parse_json(text: Option<&str>, what: &str) -> PyResult<Value> {
    match text {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| PyValueError::new_err(format!("invalid {} JSON: {}", what, e))),
        None => Ok(Value::Null),
    }
}

/// Progress tracker that also honours Ctrl+C from the Python side
struct InterruptibleTracker {
    tracker: ProgressTracker,
    interrupted: bool,
}

impl SearchCallback for InterruptibleTracker {
    fn on_iteration(&mut self, summary: &IterationSummary<'_>) {
        self.tracker.on_iteration(summary);
        if Python::with_gil(|py| py.check_signals().is_err()) {
            self.interrupted = true;
        }
    }

    fn on_task_finished(&mut self, report: &TaskReport) {
        self.tracker.on_task_finished(report);
    }

    fn should_stop(&self) -> bool {
        self.interrupted
    }
}

#[pyclass(name = "CircuitSearcher")]
pub struct PyCircuitSearcher {
    searcher: CircuitSearcher,
    verbose: bool,
}

#[pymethods]
impl PyCircuitSearcher {
    #[new]
    #[pyo3(signature = (circuit_json, database_path=None, josim_binary=None, timeout_secs=None, verbose=true))]
    fn new(
        circuit_json: &str,
        database_path: Option<PathBuf>,
        josim_binary: Option<PathBuf>,
        timeout_secs: Option<u64>,
        verbose: bool,
    ) -> PyResult<Self> {
        let circuit: CircuitSpec = serde_json::from_str(circuit_json)
            .map_err(|e| PyValueError::new_err(format!("invalid circuit JSON: {}", e)))?;

        let database = match database_path {
            Some(path) => CandidateDatabase::open(path).map_err(to_py_err)?,
            None => CandidateDatabase::in_memory(),
        };

        let mut settings = SimulationSettings::default();
        if let Some(binary) = josim_binary {
            settings.binary = binary;
        }
        if let Some(secs) = timeout_secs {
            settings.timeout_secs = secs;
        }

        let searcher = CircuitSearcher::new(circuit, Arc::new(database))
            .and_then(|s| s.with_settings(&settings))
            .map_err(to_py_err)?;
        Ok(Self { searcher, verbose })
    }

    #[pyo3(signature = (name, designer, designer_options_json, merit=None, merit_options_json=None))]
    fn add_task(
        &mut self,
        name: String,
        designer: String,
        designer_options_json: &str,
        merit: Option<String>,
        merit_options_json: Option<&str>,
    ) -> PyResult<()> {
        let mut spec = TaskSpec::new(name, designer, parse_json(Some(designer_options_json), "designer options")?);
        if let Some(merit) = merit {
            spec = spec.with_merit(merit, parse_json(merit_options_json, "merit options")?);
        }
        self.searcher.add_task(spec).map_err(to_py_err)?;
        Ok(())
    }

    /// Run all tasks; returns the number of candidates in the database
    fn execute(&self, py: Python<'_>) -> PyResult<usize> {
        let mut callback = InterruptibleTracker {
            tracker: ProgressTracker::new(self.verbose),
            interrupted: false,
        };
        let report = py
            .allow_threads(|| self.searcher.execute_with(&mut callback))
            .map_err(to_py_err)?;

        if callback.interrupted {
            return Err(PyKeyboardInterrupt::new_err("Interrupted by user (Ctrl+C)"));
        }
        Ok(report.total_candidates)
    }

    /// Up to `k` best scored candidates as `(id, merit)` pairs
    #[pyo3(signature = (k=1))]
    fn best(&self, k: usize) -> Vec<(u64, f64)> {
        self.searcher
            .database()
            .best(k)
            .iter()
            .filter_map(|c| c.merit().map(|m| (c.id().0, m)))
            .collect()
    }

    /// Parameters of one candidate as a JSON object
    fn parameters_json(&self, id: u64) -> PyResult<String> {
        let candidate = self
            .searcher
            .database()
            .get(crate::core::CandidateId(id))
            .ok_or_else(|| PyValueError::new_err(format!("no candidate #{}", id)))?;
        serde_json::to_string(candidate.parameters()).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    fn __len__(&self) -> usize {
        self.searcher.database().len()
    }
}

/// Route `tracing` output to stderr; safe to call more than once
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

#[pymodule]
fn circuitsearcher(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCircuitSearcher>()?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}

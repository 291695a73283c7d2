//! Error hierarchy for the circuit search pipeline.
//!
//! Only [`ConfigurationError`] (and the rare worker pool failure) ever reaches
//! the caller of [`crate::CircuitSearcher::execute`]. Simulation and merit
//! failures are folded into the candidate database as rejected candidates.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bounded worker pool for a task could not be created.
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

/// Setup-time failures. Raised before any simulation work begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown designer '{0}'")]
    UnknownDesigner(String),

    #[error("unknown merit '{0}'")]
    UnknownMerit(String),

    #[error("task '{task}': invalid designer options: {reason}")]
    InvalidDesignerOptions { task: String, reason: String },

    #[error("task '{task}': invalid merit options: {reason}")]
    InvalidMeritOptions { task: String, reason: String },

    #[error("task '{0}' proposes circuits but has no merit configured")]
    MissingMerit(String),

    #[error("task '{0}' is declared more than once")]
    DuplicateTask(String),

    #[error("invalid circuit specification: {0}")]
    InvalidCircuit(String),

    #[error("invalid simulation settings: {0}")]
    InvalidSimulation(String),
}

/// Failure of one external simulator invocation.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("failed to launch simulator '{binary}': {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("simulator exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("simulator exceeded the {0:?} timeout")]
    Timeout(Duration),

    #[error("simulator produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("malformed simulator output: {0}")]
    Malformed(String),

    #[error("simulator scratch io: {0}")]
    Io(#[from] std::io::Error),
}

/// The merit function declined to score a valid simulation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("merit rejected: {0}")]
pub struct MeritRejected(pub String);

impl MeritRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

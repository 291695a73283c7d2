//! Pipeline search for superconducting circuit designs.
//!
//! A [`CircuitSearcher`] runs an ordered list of tasks. Each task drives one
//! designer (random search, particle swarm, database filter) that proposes
//! parameter sets; proposals are rendered to netlists, simulated with JoSIM
//! on a bounded worker pool, scored by a merit function and recorded in a
//! shared [`CandidateDatabase`] that later tasks build on.

pub mod core;
pub mod error;
pub mod optimization;
pub mod searcher;
pub mod simulation;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use crate::core::*;
pub use error::{ConfigurationError, Error, MeritRejected, Result, SimulationError};
pub use optimization::{
    DesignerConfig, Merit, MeritKind, ProgressTracker, SearchCallback, StopReason, Task, TaskReport,
};
pub use searcher::{CircuitSearcher, PipelineReport};
pub use simulation::{JosimSimulator, NetlistRenderer, SimulationOutput, SimulationSettings, Simulator, SpiceRenderer};

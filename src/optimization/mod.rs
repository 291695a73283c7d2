pub mod callback;
pub mod designers;
pub mod evaluator;
pub mod merit;
pub mod runner;
pub mod task;

pub use callback::{IterationRecord, IterationSummary, ProgressTracker, SearchCallback};
pub use designers::{Designer, DesignerConfig, Strategy, UpdateOutcome};
pub use evaluator::{Evaluate, SimulationEvaluator};
pub use merit::{DoubleWell, DoubleWellOptions, Merit, MeritKind};
pub use runner::{StopReason, TaskReport, TaskRunner};
pub use task::Task;

pub mod config;
pub mod database;
pub mod types;

pub use config::{SearchConfig, TaskSpec};
pub use database::{CandidateDatabase, Query, Selection, Snapshot};
pub use types::*;

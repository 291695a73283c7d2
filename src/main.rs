//! Circuit search command line
//!
//! ```bash
//! # Run every task of a configuration file
//! circuit-search run --config search.json
//!
//! # Check a configuration without simulating anything
//! circuit-search validate --config search.json
//!
//! # Show the best candidates of a persisted database
//! circuit-search best --database Experiments -k 5
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use circuitsearcher::{CandidateDatabase, CircuitSearcher, Result, SearchConfig};

/// Multi-stage search for superconducting circuit parameters
#[derive(Parser)]
#[command(name = "circuit-search")]
#[command(version)]
#[command(about = "Search circuit parameters with JoSIM-driven designers")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the task pipeline
    Run {
        /// Path to the JSON configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate a configuration and its tasks
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the best candidates of a database directory
    Best {
        #[arg(short, long)]
        database: PathBuf,

        /// Number of candidates to show
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Run { config } => {
            let config = SearchConfig::load(&config)?;
            let searcher = CircuitSearcher::from_config(config)?;
            let report = searcher.execute()?;

            for (rank, candidate) in searcher.database().best(3).iter().enumerate() {
                info!(
                    rank = rank + 1,
                    id = %candidate.id(),
                    merit = ?candidate.merit(),
                    task = %candidate.provenance().task,
                    "top candidate"
                );
            }
            info!(
                tasks = report.tasks.len(),
                candidates = report.total_candidates,
                "done"
            );
        }
        Commands::Validate { config } => {
            let config = SearchConfig::load(&config)?;
            let searcher = CircuitSearcher::from_config(config)?;
            for task in searcher.tasks() {
                println!("{:<20} {}", task.name(), task.designer().describe());
            }
            println!(
                "configuration OK: {} parameters, {} tasks",
                searcher.circuit().num_params(),
                searcher.tasks().len()
            );
        }
        Commands::Best { database, k } => {
            let database = CandidateDatabase::open(&database)?;
            println!("{:<8} {:<14} {:<16} Parameters", "Id", "Merit", "Task");
            println!("{}", "-".repeat(80));
            for candidate in database.best(k) {
                let parameters = serde_json::to_string(candidate.parameters())?;
                println!(
                    "{:<8} {:<14.6e} {:<16} {}",
                    candidate.id().to_string(),
                    candidate.merit().unwrap_or(f64::NAN),
                    candidate.provenance().task,
                    parameters
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

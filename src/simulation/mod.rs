pub mod josim;
pub mod netlist;
pub mod output;

pub use josim::JosimSimulator;
pub use netlist::SpiceRenderer;
pub use output::SimulationOutput;

use crate::core::{CircuitSpec, ParameterSet};
use crate::error::{ConfigurationError, SimulationError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Turns one candidate's parameters into simulator input
pub trait NetlistRenderer: Send + Sync {
    fn render(&self, circuit: &CircuitSpec, parameters: &ParameterSet) -> String;
}

/// External circuit simulator.
///
/// Invoked concurrently from the worker pool, so implementations must not
/// share scratch files between calls.
pub trait Simulator: Send + Sync {
    fn name(&self) -> &str;

    fn simulate(&self, netlist: &str) -> Result<SimulationOutput, SimulationError>;
}

/// Simulator invocation and netlist settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Simulator executable
    pub binary: PathBuf,
    /// Per-run wall clock limit
    pub timeout_secs: u64,
    /// Analysis directive appended to every netlist
    pub transient: String,
    /// Junction model definition line
    pub junction_model: String,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("josim-cli"),
            timeout_secs: 60,
            transient: ".tran 0.1ns 100ns".to_string(),
            junction_model: ".model JJMODEL jj(rtype=1, vg=2.8mV, cap=0.07pF, r0=160, rn=16, icrit=0.1mA)"
                .to_string(),
        }
    }
}

impl SimulationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidSimulation("timeout_secs must be positive".into()));
        }
        if !self.transient.trim_start().starts_with(".tran") {
            return Err(ConfigurationError::InvalidSimulation(format!(
                "transient directive must start with .tran, got '{}'",
                self.transient
            )));
        }
        if self.binary.as_os_str().is_empty() {
            return Err(ConfigurationError::InvalidSimulation("simulator binary is empty".into()));
        }
        Ok(())
    }
}

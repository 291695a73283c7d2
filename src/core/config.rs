use super::types::CircuitSpec;
use crate::error::{ConfigurationError, Result};
use crate::simulation::SimulationSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

pub const ENV_JOSIM_BIN: &str = "CIRCUIT_SEARCH_JOSIM_BIN";
pub const ENV_DATABASE: &str = "CIRCUIT_SEARCH_DATABASE";
pub const ENV_TIMEOUT_SECS: &str = "CIRCUIT_SEARCH_TIMEOUT_SECS";

/// One pipeline stage as declared by the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub designer: String,
    #[serde(default)]
    pub designer_options: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merit: Option<String>,
    #[serde(default)]
    pub merit_options: Value,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, designer: impl Into<String>, designer_options: Value) -> Self {
        Self {
            name: name.into(),
            designer: designer.into(),
            designer_options,
            merit: None,
            merit_options: Value::Null,
        }
    }

    pub fn with_merit(mut self, merit: impl Into<String>, merit_options: Value) -> Self {
        self.merit = Some(merit.into());
        self.merit_options = merit_options;
        self
    }
}

/// Whole pipeline configuration, loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub circuit: CircuitSpec,
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Directory of the persisted database; in memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl SearchConfig {
    /// Load configuration from file and environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_json(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup(ENV_JOSIM_BIN) {
            self.simulation.binary = PathBuf::from(val);
        }
        if let Some(val) = lookup(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup(ENV_TIMEOUT_SECS) {
            match val.trim().parse() {
                Ok(secs) => self.simulation.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %val, "ignoring malformed {}", ENV_TIMEOUT_SECS),
            }
        }
    }

    /// Validate the circuit, simulation settings and task names. Designer and
    /// merit options are checked when the tasks are added to a searcher.
    pub fn validate(&self) -> Result<()> {
        self.circuit.validate()?;
        self.simulation.validate()?;

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(ConfigurationError::DuplicateTask(task.name.clone()).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;

    const FOUR_COUPLER: &str = r#"{
        "circuit": {
            "c_specs": {"kind": "capacitor", "dimension": 6, "low": 1, "high": 100, "keep_prob": 0.5},
            "j_specs": {"kind": "junction", "dimension": 6, "low": 99, "high": 1982, "keep_num": 3},
            "l_specs": {"kind": "inductor", "dimension": 6, "low": 75, "high": 300},
            "phiOffs_specs": {"kind": "phase_offset", "dimension": 4, "values": [0.0, 0.5]}
        },
        "database_path": "Experiments",
        "tasks": [
            {"name": "random", "designer": "random",
             "designer_options": {"max_iters": 3, "max_concurrent": 2, "batch_size": 10},
             "merit": "DoubleWell",
             "merit_options": {"max_peak": 1.5, "max_split": 10, "norm_p": 4, "flux_sens": true, "max_merit": 100}},
            {"name": "filter", "designer": "filter_db", "designer_options": {"num_circuits": 2}}
        ]
    }"#;

    #[test]
    fn test_parse_full_configuration() {
        let config = SearchConfig::from_json(FOUR_COUPLER).unwrap();
        assert_eq!(config.circuit.num_params(), 22);
        assert_eq!(config.simulation, SimulationSettings::default());
        assert_eq!(config.database_path, Some(PathBuf::from("Experiments")));
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].merit.as_deref(), Some("DoubleWell"));
        assert_eq!(config.tasks[1].merit, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = SearchConfig::from_json(FOUR_COUPLER).unwrap();
        let vars: HashMap<&str, &str> = [
            (ENV_JOSIM_BIN, "/opt/josim/bin/josim-cli"),
            (ENV_DATABASE, "/tmp/runs"),
            (ENV_TIMEOUT_SECS, "15"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.simulation.binary, PathBuf::from("/opt/josim/bin/josim-cli"));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/runs")));
        assert_eq!(config.simulation.timeout_secs, 15);
    }

    #[test]
    fn test_malformed_timeout_override_is_ignored() {
        let mut config = SearchConfig::from_json(FOUR_COUPLER).unwrap();
        config.apply_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()));
        assert_eq!(config.simulation.timeout_secs, 60);
    }

    #[test]
    fn test_duplicate_task_names() {
        let mut config = SearchConfig::from_json(FOUR_COUPLER).unwrap();
        config.tasks[1].name = "random".into();
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(ConfigurationError::DuplicateTask(name))) if name == "random"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, FOUR_COUPLER).unwrap();
        let config = SearchConfig::load(&path).unwrap();
        assert_eq!(config.tasks[0].name, "random");

        assert!(matches!(SearchConfig::load(dir.path().join("missing.json")), Err(Error::Io(_))));
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(SearchConfig::load(&path), Err(Error::Serialization(_))));
    }
}

use crate::error::ConfigurationError;
use crate::simulation::SimulationOutput;
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

// ===== ENUMS =====

/// Circuit element family a parameter group controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Capacitor,
    Junction,
    Inductor,
    PhaseOffset,
}

/// The closed set of search strategies a task can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignerKind {
    RandomSearch,
    ParticleSwarm,
    DatabaseFilter,
}

impl DesignerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomSearch => "random",
            Self::ParticleSwarm => "particle_swarms",
            Self::DatabaseFilter => "filter_db",
        }
    }

    /// Whether the designer proposes circuits that need simulating
    pub fn is_generator(&self) -> bool {
        !matches!(self, Self::DatabaseFilter)
    }
}

impl fmt::Display for DesignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesignerKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" | "random_search" => Ok(Self::RandomSearch),
            "particle_swarms" | "particle_swarm" | "pso" => Ok(Self::ParticleSwarm),
            "filter_db" | "database_filter" | "filter" => Ok(Self::DatabaseFilter),
            _ => Err(ConfigurationError::UnknownDesigner(s.to_string())),
        }
    }
}

/// Why a candidate could not be scored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Simulator crashed, timed out or produced unusable output
    Simulation,
    /// Simulation was fine but the merit function declined to score it
    Merit,
}

// ===== CIRCUIT SPECIFICATION =====

/// Declared search range of one component group.
///
/// A group either spans a continuous `[low, high]` range or picks from a
/// discrete `values` list (phase offsets).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub kind: ComponentKind,
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
    /// Topology pruning knobs; accepted but not applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_prob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_num: Option<f64>,
}

impl GroupSpec {
    pub fn range(kind: ComponentKind, dimension: usize, low: f64, high: f64) -> Self {
        Self {
            kind,
            dimension,
            low: Some(low),
            high: Some(high),
            values: Vec::new(),
            keep_prob: None,
            keep_num: None,
        }
    }

    pub fn discrete(kind: ComponentKind, dimension: usize, values: Vec<f64>) -> Self {
        Self {
            kind,
            dimension,
            low: None,
            high: None,
            values,
            keep_prob: None,
            keep_num: None,
        }
    }

    /// Names of pruning options present in the configuration
    pub fn ignored_options(&self) -> Vec<&'static str> {
        [("keep_prob", self.keep_prob.is_some()), ("keep_num", self.keep_num.is_some())]
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }

    pub fn is_discrete(&self) -> bool {
        !self.values.is_empty()
    }

    /// Effective `(low, high)` of the group
    pub fn bounds(&self) -> (f64, f64) {
        let low = self
            .low
            .unwrap_or_else(|| self.values.iter().copied().fold(f64::INFINITY, f64::min));
        let high = self
            .high
            .unwrap_or_else(|| self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        (low, high)
    }

    pub fn contains(&self, value: f64) -> bool {
        let (low, high) = self.bounds();
        value >= low && value <= high
    }

    /// Clamp into range, then snap to the nearest allowed value for discrete groups
    pub fn project(&self, value: f64) -> f64 {
        let (low, high) = self.bounds();
        let clamped = value.clamp(low, high);
        if !self.is_discrete() {
            return clamped;
        }
        self.values
            .iter()
            .copied()
            .min_by(|a, b| (a - clamped).abs().total_cmp(&(b - clamped).abs()))
            .unwrap_or(clamped)
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.is_discrete() {
            return self.values[rng.gen_range(0..self.values.len())];
        }
        let (low, high) = self.bounds();
        rng.gen_range(low..=high)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidCircuit(format!("group '{}': {}", name, reason));

        if self.dimension == 0 {
            return Err(invalid("dimension must be positive".into()));
        }
        if !self.is_discrete() && (self.low.is_none() || self.high.is_none()) {
            return Err(invalid("needs either low/high or a values list".into()));
        }
        let (low, high) = self.bounds();
        if !low.is_finite() || !high.is_finite() {
            return Err(invalid("bounds must be finite".into()));
        }
        if low > high {
            return Err(invalid(format!("low {} exceeds high {}", low, high)));
        }
        if let Some(v) = self.values.iter().find(|v| !self.contains(**v)) {
            return Err(invalid(format!("value {} outside [{}, {}]", v, low, high)));
        }
        let ignored = self.ignored_options();
        if !ignored.is_empty() {
            warn!(group = name, options = ?ignored, "topology pruning is not supported; options ignored");
        }
        Ok(())
    }
}

/// Ordered set of parameter groups describing the circuit topology space.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitSpec {
    groups: IndexMap<String, GroupSpec>,
}

impl CircuitSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: impl Into<String>, spec: GroupSpec) -> Self {
        self.groups.insert(name.into(), spec);
        self
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &GroupSpec)> {
        self.groups.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn group(&self, name: &str) -> Option<&GroupSpec> {
        self.groups.get(name)
    }

    /// Total number of scalar parameters across all groups
    pub fn num_params(&self) -> usize {
        self.groups.values().map(|g| g.dimension).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.groups.is_empty() {
            return Err(ConfigurationError::InvalidCircuit("no parameter groups declared".into()));
        }
        for (name, spec) in &self.groups {
            spec.validate(name)?;
        }
        Ok(())
    }

    /// Per-scalar bounds in flattened group order
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.groups
            .values()
            .flat_map(|g| std::iter::repeat(g.bounds()).take(g.dimension))
            .collect()
    }

    /// Draw one parameter set uniformly from the declared ranges
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterSet {
        self.groups
            .iter()
            .map(|(name, g)| (name.clone(), (0..g.dimension).map(|_| g.sample(rng)).collect()))
            .collect()
    }

    /// Flatten a parameter set into a position vector. `None` when the set
    /// does not match this specification's layout.
    pub fn flatten(&self, params: &ParameterSet) -> Option<Vec<f64>> {
        let mut flat = Vec::with_capacity(self.num_params());
        for (name, g) in &self.groups {
            let values = params.get(name)?;
            if values.len() != g.dimension {
                return None;
            }
            flat.extend_from_slice(values);
        }
        Some(flat)
    }

    /// Project a position vector in place onto the declared ranges
    pub fn project(&self, flat: &mut [f64]) {
        let scalars = self
            .groups
            .values()
            .flat_map(|g| std::iter::repeat(g).take(g.dimension));
        for (value, group) in flat.iter_mut().zip(scalars) {
            *value = group.project(*value);
        }
    }

    /// Rebuild a parameter set from a position vector, projecting every value
    /// back into its group's declared range.
    pub fn assemble(&self, flat: &[f64]) -> ParameterSet {
        let mut offset = 0;
        self.groups
            .iter()
            .map(|(name, g)| {
                let values = flat[offset..offset + g.dimension]
                    .iter()
                    .map(|&v| g.project(v))
                    .collect();
                offset += g.dimension;
                (name.clone(), values)
            })
            .collect()
    }

    pub fn contains(&self, params: &ParameterSet) -> bool {
        self.groups.iter().all(|(name, g)| {
            params
                .get(name)
                .is_some_and(|values| values.len() == g.dimension && values.iter().all(|&v| g.contains(v)))
        })
    }
}

// ===== CANDIDATES =====

/// Values of one circuit instance, keyed by group name in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(IndexMap<String, Vec<f64>>);

impl ParameterSet {
    pub fn get(&self, group: &str) -> Option<&[f64]> {
        self.0.get(group).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Vec<f64>)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f64>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u64);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scoring result recorded with every candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Evaluation {
    Scored { merit: f64 },
    Rejected { kind: RejectionKind, reason: String },
}

impl Evaluation {
    pub fn merit(&self) -> Option<f64> {
        match self {
            Self::Scored { merit } => Some(*merit),
            Self::Rejected { .. } => None,
        }
    }
}

/// What an evaluation job hands back to the runner.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub evaluation: Evaluation,
    pub simulation_result: Option<Arc<SimulationOutput>>,
}

impl Outcome {
    pub fn scored(merit: f64, simulation_result: Option<Arc<SimulationOutput>>) -> Self {
        Self {
            evaluation: Evaluation::Scored { merit },
            simulation_result,
        }
    }

    pub fn rejected(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            evaluation: Evaluation::Rejected {
                kind,
                reason: reason.into(),
            },
            simulation_result: None,
        }
    }

    pub fn with_simulation_result(mut self, output: Arc<SimulationOutput>) -> Self {
        self.simulation_result = Some(output);
        self
    }
}

/// Which task produced a candidate, and where in its run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub task: String,
    pub designer: DesignerKind,
    pub iteration: u32,
    pub slot: usize,
}

/// Everything needed to record a candidate; the database assigns the id.
#[derive(Clone, Debug)]
pub struct NewCandidate {
    pub parameters: ParameterSet,
    pub outcome: Outcome,
    pub provenance: Provenance,
}

/// One evaluated circuit instance. Read-only once recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    id: CandidateId,
    parameters: ParameterSet,
    evaluation: Evaluation,
    provenance: Provenance,
    #[serde(skip)]
    simulation_result: Option<Arc<SimulationOutput>>,
}

impl Candidate {
    pub(crate) fn new(id: CandidateId, new: NewCandidate) -> Self {
        Self {
            id,
            parameters: new.parameters,
            evaluation: new.outcome.evaluation,
            provenance: new.provenance,
            simulation_result: new.outcome.simulation_result,
        }
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    /// Merit of a scored candidate; `None` when rejected
    pub fn merit(&self) -> Option<f64> {
        self.evaluation.merit()
    }

    pub fn is_scored(&self) -> bool {
        self.merit().is_some()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn simulation_result(&self) -> Option<&SimulationOutput> {
        self.simulation_result.as_deref()
    }
}

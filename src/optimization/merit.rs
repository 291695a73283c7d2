//! Merit functions scoring simulated spectra. Lower is better.

use crate::error::{ConfigurationError, MeritRejected};
use crate::simulation::SimulationOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeritKind {
    DoubleWell,
}

impl MeritKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoubleWell => "DoubleWell",
        }
    }
}

impl fmt::Display for MeritKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeritKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "").as_str() {
            "doublewell" => Ok(Self::DoubleWell),
            _ => Err(ConfigurationError::UnknownMerit(s.to_string())),
        }
    }
}

/// Configured merit function. Pure, so it is shared freely across workers.
#[derive(Clone, Debug, PartialEq)]
pub enum Merit {
    DoubleWell(DoubleWell),
}

impl Merit {
    /// Build a merit from its kind and raw JSON options
    pub fn from_options(kind: MeritKind, options: &Value, task: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidMeritOptions {
            task: task.to_string(),
            reason,
        };
        // absent options mean "all defaults"
        let options = if options.is_null() {
            Value::Object(Default::default())
        } else {
            options.clone()
        };

        match kind {
            MeritKind::DoubleWell => {
                let opts: DoubleWellOptions =
                    serde_json::from_value(options).map_err(|e| invalid(e.to_string()))?;
                opts.validate().map_err(invalid)?;
                Ok(Self::DoubleWell(DoubleWell::new(opts)))
            }
        }
    }

    pub fn kind(&self) -> MeritKind {
        match self {
            Self::DoubleWell(_) => MeritKind::DoubleWell,
        }
    }

    pub fn evaluate(&self, output: &SimulationOutput) -> Result<f64, MeritRejected> {
        match self {
            Self::DoubleWell(dw) => dw.evaluate(output),
        }
    }
}

/// Options of the double-well merit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DoubleWellOptions {
    /// Number of dominant peaks tolerated without penalty
    pub max_peak: f64,
    /// Minimum separation of the two deepest minima along the axis
    pub max_split: f64,
    /// Exponent of the norm aggregating the penalty terms
    pub norm_p: f64,
    /// Penalize asymmetric wells (flux sensitivity)
    pub flux_sens: bool,
    /// Upper clamp of the final score
    pub max_merit: f64,
    pub target_minima: usize,
    /// Extremum prominence, as a fraction of the trace range, needed to count
    pub peak_prominence: f64,
    /// Trace to score; defaults to the first non-axis column
    pub trace: Option<String>,
}

impl Default for DoubleWellOptions {
    fn default() -> Self {
        Self {
            max_peak: 1.5,
            max_split: 10.0,
            norm_p: 4.0,
            flux_sens: true,
            max_merit: 100.0,
            target_minima: 2,
            peak_prominence: 0.1,
            trace: None,
        }
    }
}

impl DoubleWellOptions {
    fn validate(&self) -> Result<(), String> {
        if !(self.max_peak >= 0.0) {
            return Err(format!("max_peak must be non-negative, got {}", self.max_peak));
        }
        if !(self.max_split > 0.0) {
            return Err(format!("max_split must be positive, got {}", self.max_split));
        }
        if !(self.norm_p >= 1.0) || !self.norm_p.is_finite() {
            return Err(format!("norm_p must be a finite value >= 1, got {}", self.norm_p));
        }
        if !(self.max_merit > 0.0) {
            return Err(format!("max_merit must be positive, got {}", self.max_merit));
        }
        if self.target_minima == 0 {
            return Err("target_minima must be positive".into());
        }
        if !(self.peak_prominence > 0.0 && self.peak_prominence <= 1.0) {
            return Err(format!("peak_prominence must be in (0, 1], got {}", self.peak_prominence));
        }
        Ok(())
    }
}

/// Scores how closely a trace resembles a symmetric double well: the target
/// number of minima, few dominant peaks, and well separated wells.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleWell {
    options: DoubleWellOptions,
}

impl DoubleWell {
    pub fn new(options: DoubleWellOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DoubleWellOptions {
        &self.options
    }

    pub fn evaluate(&self, output: &SimulationOutput) -> Result<f64, MeritRejected> {
        let opts = &self.options;
        let axis = output
            .axis()
            .ok_or_else(|| MeritRejected::new("output has no columns"))?;
        let trace = match &opts.trace {
            Some(name) => output
                .trace(name)
                .ok_or_else(|| MeritRejected::new(format!("trace '{}' not in output", name)))?,
            None => output
                .first_trace()
                .map(|(_, values)| values)
                .ok_or_else(|| MeritRejected::new("output has no trace column"))?,
        };

        if trace.len() < 3 || trace.len() != axis.len() {
            return Err(MeritRejected::new(format!(
                "need at least 3 aligned samples, got {} on an axis of {}",
                trace.len(),
                axis.len()
            )));
        }
        if trace.iter().chain(axis).any(|v| !v.is_finite()) {
            return Err(MeritRejected::new("trace contains non-finite values"));
        }

        let (lo, hi) = trace
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = hi - lo;
        if range <= 0.0 {
            return Err(MeritRejected::new("flat trace"));
        }
        let threshold = opts.peak_prominence * range;

        let peaks = dominant_extrema(trace, threshold, 1.0);
        let mut minima = dominant_extrema(trace, threshold, -1.0);
        minima.sort_by(|&a, &b| trace[a].total_cmp(&trace[b]));

        let mut terms = Vec::with_capacity(4);
        terms.push(opts.target_minima.saturating_sub(minima.len()) as f64);
        terms.push((peaks.len() as f64 - opts.max_peak).max(0.0));

        let deepest = if minima.len() >= 2 { Some((minima[0], minima[1])) } else { None };
        match deepest {
            Some((a, b)) => {
                let separation = (axis[a] - axis[b]).abs();
                terms.push(((opts.max_split - separation) / opts.max_split).max(0.0));
                if opts.flux_sens {
                    terms.push((trace[a] - trace[b]).abs() / range);
                }
            }
            None => {
                terms.push(1.0);
                if opts.flux_sens {
                    terms.push(1.0);
                }
            }
        }

        let norm = terms.iter().map(|t| t.powf(opts.norm_p)).sum::<f64>().powf(1.0 / opts.norm_p);
        Ok(norm.min(opts.max_merit))
    }
}

/// Indices of interior local extrema whose prominence reaches `threshold`.
/// `sign` = 1.0 finds maxima, -1.0 finds minima.
fn dominant_extrema(trace: &[f64], threshold: f64, sign: f64) -> Vec<usize> {
    let value = |i: usize| sign * trace[i];
    (1..trace.len() - 1)
        .filter(|&i| value(i) > value(i - 1) && value(i) >= value(i + 1))
        .filter(|&i| prominence(trace, i, sign) >= threshold)
        .collect()
}

/// Height of an extremum above the higher of its two bases. Each base is the
/// lowest point (in signed terms) walking outwards until a higher point or the
/// trace edge is reached.
fn prominence(trace: &[f64], i: usize, sign: f64) -> f64 {
    let value = |j: usize| sign * trace[j];
    let peak = value(i);

    let mut left_base = peak;
    for j in (0..i).rev() {
        if value(j) > peak {
            break;
        }
        left_base = left_base.min(value(j));
    }

    let mut right_base = peak;
    for j in i + 1..trace.len() {
        if value(j) > peak {
            break;
        }
        right_base = right_base.min(value(j));
    }

    peak - left_base.max(right_base)
}

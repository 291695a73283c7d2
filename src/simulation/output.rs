use crate::error::SimulationError;
use indexmap::IndexMap;

/// Time-series or swept data returned by one simulator run.
///
/// Columns keep the order of the simulator's header; the first column is the
/// independent axis (time for a transient run).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationOutput {
    columns: IndexMap<String, Vec<f64>>,
}

impl SimulationOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; all columns must share the axis length
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    /// Parse comma separated output with a single header row
    pub fn from_csv(text: &str) -> Result<Self, SimulationError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| SimulationError::Malformed("empty output".into()))?;
        let names: Vec<String> = header.split(',').map(|h| h.trim().trim_matches('"').to_string()).collect();
        if names.len() < 2 {
            return Err(SimulationError::Malformed(format!(
                "expected an axis and at least one trace, found header '{}'",
                header
            )));
        }

        let mut data: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        for (row, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != names.len() {
                return Err(SimulationError::Malformed(format!(
                    "row {} has {} fields, header has {}",
                    row + 1,
                    fields.len(),
                    names.len()
                )));
            }
            for (col, field) in fields.iter().enumerate() {
                let value = field.trim().parse::<f64>().map_err(|e| {
                    SimulationError::Malformed(format!("row {} column '{}': {}", row + 1, names[col], e))
                })?;
                data[col].push(value);
            }
        }

        if data[0].is_empty() {
            return Err(SimulationError::Malformed("header without data rows".into()));
        }

        Ok(Self {
            columns: names.into_iter().zip(data).collect(),
        })
    }

    /// Independent axis values
    pub fn axis(&self) -> Option<&[f64]> {
        self.columns.values().next().map(Vec::as_slice)
    }

    pub fn trace(&self, name: &str) -> Option<&[f64]> {
        // JoSIM upper-cases device names in headers
        self.columns
            .get(name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(Vec::as_slice)
    }

    /// First non-axis column
    pub fn first_trace(&self) -> Option<(&str, &[f64])> {
        self.columns.iter().nth(1).map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.axis().map_or(0, |axis| axis.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

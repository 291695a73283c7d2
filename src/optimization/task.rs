use super::designers::DesignerConfig;
use super::merit::Merit;
use crate::core::{DesignerKind, TaskSpec};
use crate::error::ConfigurationError;
use tracing::warn;

/// A validated pipeline stage: designer options and merit are parsed once,
/// when the task is added, so a bad configuration never costs a simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    name: String,
    designer: DesignerConfig,
    merit: Option<Merit>,
}

impl Task {
    pub fn from_spec(spec: &TaskSpec) -> Result<Self, ConfigurationError> {
        if spec.name.trim().is_empty() {
            return Err(ConfigurationError::InvalidDesignerOptions {
                task: spec.name.clone(),
                reason: "task name is empty".into(),
            });
        }

        let kind: DesignerKind = spec.designer.parse()?;
        let designer = DesignerConfig::from_options(kind, &spec.designer_options, &spec.name)?;

        let merit = match &spec.merit {
            Some(name) => Some(Merit::from_options(name.parse()?, &spec.merit_options, &spec.name)?),
            None => None,
        };

        if kind.is_generator() && merit.is_none() {
            return Err(ConfigurationError::MissingMerit(spec.name.clone()));
        }
        if !kind.is_generator() && merit.is_some() {
            warn!(task = %spec.name, "merit is ignored by the {} designer", kind);
        }

        Ok(Self {
            name: spec.name.clone(),
            designer,
            merit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DesignerKind {
        self.designer.kind()
    }

    pub fn designer(&self) -> &DesignerConfig {
        &self.designer
    }

    pub fn merit(&self) -> Option<&Merit> {
        self.merit.as_ref()
    }
}

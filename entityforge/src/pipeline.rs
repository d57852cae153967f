//! Step bookkeeping for the multi-step definition pipelines.
//!
//! Pipelines do not roll back. When a step fails, the steps listed in
//! [`PipelineError::completed`] stay applied and the caller decides how to
//! repair.

use std::fmt;

use thiserror::Error;

use crate::error::ForgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    ValidateDefinition,
    LoadDefinition,
    CompareDefinitions,
    CreateTable,
    MigrateTable,
    SynthesizeSchema,
    StoreDefinition,
    RegisterAdapter,
    DropTable,
    DeleteCatalogRows,
    DeleteSchemaArtifact,
    DeleteDefinition,
    UnregisterAdapter,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::ValidateDefinition => "validate definition",
            PipelineStep::LoadDefinition => "load definition",
            PipelineStep::CompareDefinitions => "compare definitions",
            PipelineStep::CreateTable => "create table",
            PipelineStep::MigrateTable => "migrate table",
            PipelineStep::SynthesizeSchema => "synthesize schema",
            PipelineStep::StoreDefinition => "store definition",
            PipelineStep::RegisterAdapter => "register adapter",
            PipelineStep::DropTable => "drop table",
            PipelineStep::DeleteCatalogRows => "delete catalog rows",
            PipelineStep::DeleteSchemaArtifact => "delete schema artifact",
            PipelineStep::DeleteDefinition => "delete definition",
            PipelineStep::UnregisterAdapter => "unregister adapter",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{pipeline} of '{definition_id}' stopped at step '{step}': {source}")]
pub struct PipelineError {
    pub pipeline: &'static str,
    pub definition_id: String,
    pub step: PipelineStep,
    /// Steps that finished before `step` failed. Their effects remain.
    pub completed: Vec<PipelineStep>,
    #[source]
    pub source: ForgeError,
}

/// Records completed steps and turns the first failure into a [`PipelineError`].
#[derive(Debug)]
pub(crate) struct Progress {
    pipeline: &'static str,
    definition_id: String,
    completed: Vec<PipelineStep>,
}

impl Progress {
    pub(crate) fn new(pipeline: &'static str, definition_id: &str) -> Self {
        Self {
            pipeline,
            definition_id: definition_id.to_string(),
            completed: Vec::new(),
        }
    }

    /// Record the outcome of `step`.
    ///
    /// A failure before any side effect is returned unwrapped, so callers see
    /// plain validation errors for bad input.
    pub(crate) fn step<T>(
        &mut self,
        step: PipelineStep,
        result: Result<T, ForgeError>,
    ) -> Result<T, ForgeError> {
        match result {
            Ok(value) => {
                log::debug!("{} '{}': {step} done", self.pipeline, self.definition_id);
                self.completed.push(step);
                Ok(value)
            }
            Err(source) if !self.has_side_effects() => Err(source),
            Err(source) => {
                log::error!(
                    "{} '{}' failed at {step} after {:?}: {source}",
                    self.pipeline,
                    self.definition_id,
                    self.completed
                );
                Err(ForgeError::Pipeline(Box::new(PipelineError {
                    pipeline: self.pipeline,
                    definition_id: self.definition_id.clone(),
                    step,
                    completed: std::mem::take(&mut self.completed),
                    source,
                })))
            }
        }
    }

    pub(crate) fn completed(&self) -> &[PipelineStep] {
        &self.completed
    }

    fn has_side_effects(&self) -> bool {
        self.completed.iter().any(|step| {
            !matches!(
                step,
                PipelineStep::ValidateDefinition
                    | PipelineStep::LoadDefinition
                    | PipelineStep::CompareDefinitions
            )
        })
    }
}

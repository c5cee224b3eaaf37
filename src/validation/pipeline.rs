//! Validation pipeline implementation.

use crate::core::error::TilestreamResult;
use crate::execution::terminal::Terminal;
use crate::graph::structure::PipelineGraph;
use crate::validation::stages::{
    ConfigurationValidation, StructuralValidation, ValidationStage, ValidationWarning,
};
use std::time::Instant;

/// Outcome of a successful validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Non-fatal findings, in stage order.
    pub warnings: Vec<ValidationWarning>,
    /// Names of the stages that ran.
    pub stages: Vec<String>,
    /// Time taken for validation in milliseconds.
    pub duration_ms: u64,
}

/// Multi-stage validation pipeline.
///
/// Runs a series of validation stages before a streaming run starts, so
/// configuration and wiring mistakes surface before any worker thread is
/// spawned. The first failing stage aborts validation.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Create the default validation pipeline with all standard stages.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![Box::new(StructuralValidation), Box::new(ConfigurationValidation)],
        }
    }

    /// Create a minimal pipeline (structural checks only).
    pub fn minimal_pipeline() -> Self {
        Self {
            stages: vec![Box::new(StructuralValidation)],
        }
    }

    /// Add a custom validation stage.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Validate the part of `graph` read by `terminal` through all stages.
    pub fn validate(
        &self,
        graph: &PipelineGraph,
        terminal: &dyn Terminal,
    ) -> TilestreamResult<ValidationReport> {
        let start = Instant::now();
        let mut report = ValidationReport::default();

        for stage in &self.stages {
            let warnings = stage.validate(graph, terminal).map_err(|error| {
                log::error!("{} failed: {}", stage.name(), error);
                error
            })?;
            for warning in &warnings {
                log::warn!("{}: {}", stage.name(), warning.message);
            }
            report.warnings.extend(warnings);
            report.stages.push(stage.name().to_string());
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}

//! Validation module for pre-execution checking.
//!
//! The validation pipeline runs before a streaming run to catch errors early.

pub mod pipeline;
pub mod stages;

pub use pipeline::{ValidationPipeline, ValidationReport};
pub use stages::{ConfigurationValidation, StructuralValidation, ValidationStage, ValidationWarning};

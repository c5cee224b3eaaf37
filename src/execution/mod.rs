//! Execution engine module.
//!
//! This module streams pipelines: division planning, per-division thread
//! dispatch, the accumulator life-cycle, and the driver tying them together.

pub mod dispatcher;
pub mod engine;
pub mod persistent;
pub mod progress;
pub mod streaming;
pub mod terminal;

pub use dispatcher::ThreadDispatcher;
pub use engine::{ExecutionOptions, Pipeline, RunReport};
pub use persistent::{Accumulator, PersistentFilter, PipelineState};
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
pub use streaming::{StreamingConfig, StreamingMode, StreamingPlan, DEFAULT_MEMORY_LIMIT};
pub use terminal::{DivisionContext, RasterWriter, Terminal};

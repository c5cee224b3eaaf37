//! # Tilestream - Streaming Tile-Based Raster Pipelines
//!
//! Tilestream runs raster processing pipelines over images far larger than
//! memory. The requested output is cut into sequential streaming divisions,
//! every division is split across worker threads, and thread-private partial
//! results are merged in a fixed order into one final aggregate.
//!
//! ## Features
//!
//! - **Streaming**: division count from a memory budget, a line count, a
//!   tile size or an explicit number
//! - **Region negotiation**: neighborhood filters get padded input regions
//!   without the caller knowing the padding
//! - **Fork/join threading**: one join barrier per division, deterministic merge
//! - **Accumulators**: statistics, confusion matrices, Hoover metrics, label sets
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tilestream::prelude::*;
//!
//! # fn main() -> TilestreamResult<()> {
//! let mut graph = PipelineGraph::new();
//! let image = graph.add_source(ConstantSource::new(10_000, 10_000, ComponentType::U8, 7.0));
//!
//! let mut pipeline = Pipeline::new(graph)
//!     .with_streaming(StreamingConfig::new().with_memory_budget_mb(64))
//!     .with_options(ExecutionOptions::new().with_max_threads(4));
//!
//! let mut stats = PersistentFilter::new(StreamingStatistics::new(), &[image]);
//! pipeline.update(&mut stats)?;
//! if let Some(result) = stats.result() {
//!     println!("mean = {}", result.mean[0]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: regions, splitting, rasters, sources, the filter trait, errors
//! - [`graph`]: arena graph, topology and requested-region propagation
//! - [`execution`]: streaming plan, thread dispatcher, accumulator life-cycle, engine
//! - [`accumulators`]: built-in accumulators
//! - [`filters`]: filter registry and built-in neighborhood filters
//! - [`validation`]: checks run before any thread starts
//! - [`config`]: TOML configuration for the command-line tool

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulators;
pub mod config;
pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;
pub mod validation;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use tilestream::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::neighborhood::{EdgePolicy, Neighborhood};
    pub use crate::core::raster::{ComponentType, ImageInfo, Raster};
    pub use crate::core::region::{ImageRadius, ImageRegion, Radius, Region};
    pub use crate::core::splitter::RegionSplitter;

    // Sources and filters
    pub use crate::core::io::{save_raster, ImageFileSource};
    pub use crate::core::node::{Category, FilterMetadata, ImageFilter, TileContext};
    pub use crate::core::source::{ConstantSource, ImageSource, MemorySource, SyntheticSource};

    // Errors
    pub use crate::core::error::{
        ComputeError, ConfigurationError, GraphError, NodeId, RegionError, ResourceError,
        TilestreamError, TilestreamResult,
    };

    // Graph
    pub use crate::graph::{PipelineGraph, RequestedRegionPropagator, TopologyAnalyzer};

    // Validation
    pub use crate::validation::{ValidationPipeline, ValidationStage};

    // Execution
    pub use crate::execution::{
        Accumulator, ExecutionOptions, PersistentFilter, Pipeline, PipelineState,
        ProgressTracker, ProgressUpdate, RasterWriter, RunReport, StreamingConfig,
        StreamingMode, StreamingPlan, Terminal, ThreadDispatcher,
    };

    // Accumulators
    pub use crate::accumulators::{
        ConfusionMatrix, ConfusionMatrixAccumulator, HooverAccumulator, HooverMatrix,
        LabelSetAccumulator, Statistics, StatisticsConfig, StreamingStatistics,
    };

    // Filters
    pub use crate::filters::{
        EdgeDensityFilter, FilterRegistry, MajorityVotingFilter, PointwiseFilter, TiePolicy,
    };

    // Configuration
    pub use crate::config::AppConfig;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

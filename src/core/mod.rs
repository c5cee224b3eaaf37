//! Core types and traits for Tilestream.
//!
//! This module contains the foundational types the engine is built from:
//! - Regions, radii and region splitting
//! - Raster buffers and image information
//! - Neighborhood windows and border policies
//! - Sources, the filter capability trait, and file I/O
//! - Error types

pub mod error;
pub mod region;
pub mod splitter;
pub mod raster;
pub mod neighborhood;
pub mod source;
pub mod node;
pub mod io;

// Re-export commonly used types
pub use error::{
    ComputeError, ConfigurationError, GraphError, NodeId, RegionError, ResourceError,
    TilestreamError, TilestreamResult,
};
pub use region::{ImageRadius, ImageRegion, Radius, Region};
pub use splitter::{RegionSplitter, SplitStrategy};
pub use raster::{ComponentType, ImageInfo, Raster};
pub use neighborhood::{EdgePolicy, Neighborhood};
pub use source::{ConstantSource, ImageSource, MemorySource, SyntheticSource};
pub use node::{Category, FilterMetadata, ImageFilter, TileContext};
pub use io::{save_raster, ImageFileSource};

//! Built-in filter implementations.
//!
//! This module contains the standard filters that ship with Tilestream.

mod density;
mod majority;
mod pointwise;

use crate::core::error::TilestreamResult;
use crate::filters::registry::FilterRegistry;

/// Register all built-in filters.
pub fn register_all(registry: &mut FilterRegistry) -> TilestreamResult<()> {
    majority::register(registry)?;
    density::register(registry)?;
    pointwise::register(registry)?;
    Ok(())
}

// Re-export for direct access
pub use density::{EdgeDensityFilter, EdgeDensityParams};
pub use majority::{MajorityVotingFilter, MajorityVotingParams, TiePolicy};
pub use pointwise::{PixelFunction, PointwiseFilter, ThresholdParams};

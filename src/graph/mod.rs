//! Graph module for managing pipeline graphs.
//!
//! A pipeline graph is a directed acyclic graph (DAG) where nodes are sources
//! or filters and edges are input slots pointing upstream.

pub mod structure;
pub mod topology;
pub mod propagation;

// Re-export commonly used types
pub use structure::{NodeKind, PipelineGraph, PipelineNode};
pub use topology::TopologyAnalyzer;
pub use propagation::{compute_input_region, RequestedRegionPropagator, RequestedRegions};

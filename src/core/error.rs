//! Error types for Tilestream.
//!
//! Uses thiserror for structured errors with context. The taxonomy mirrors the
//! phases of a streaming run:
//! - [`ConfigurationError`] and [`RegionError`] are detected eagerly, before any
//!   worker thread is spawned
//! - [`ComputeError`] is raised by a per-tile task and aborts the run
//! - [`ResourceError`] is raised when per-thread accumulators cannot be allocated

use crate::core::region::ImageRegion;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Index of a node in the pipeline graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Top-level error type for Tilestream.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum TilestreamError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Run cancelled after {completed}/{total} divisions")]
    Cancelled { completed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

/// Invalid parameters, detected before dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Split count must be at least 1, got {0}")]
    InvalidSplitCount(usize),

    #[error("Axis {axis} is out of range for a {dimension}-D region")]
    InvalidAxis { axis: usize, dimension: usize },

    #[error("Streaming modes are mutually exclusive, got: {}", modes.join(", "))]
    ConflictingStreamingModes { modes: Vec<&'static str> },

    #[error("Streaming parameter '{parameter}' must be greater than zero")]
    ZeroStreamingParameter { parameter: &'static str },

    #[error("Undecided label {label} collides with {reason}")]
    UndecidedLabelCollision { label: i64, reason: String },

    #[error("Filter '{filter}' expects {expected} input(s), got {got}")]
    InputCount {
        filter: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid parameter '{parameter}' for '{filter}': {reason}")]
    InvalidParameter {
        filter: String,
        parameter: String,
        reason: String,
    },

    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),
}

/// Malformed or inconsistent region requests, detected before dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("Requested region {requested} is outside the largest region {largest}")]
    OutOfBounds {
        requested: ImageRegion,
        largest: ImageRegion,
    },

    #[error("Inputs of node {node} request incongruent regions: {first} vs {other}")]
    Incongruent {
        node: String,
        first: ImageRegion,
        other: ImageRegion,
    },

    #[error("Split index {index} is out of range for {count} pieces")]
    SplitIndexOutOfRange { index: usize, count: usize },

    #[error("Band count mismatch on node {node}: expected {expected}, got {got}")]
    BandMismatch {
        node: String,
        expected: usize,
        got: usize,
    },
}

/// Failure inside a per-tile task.
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Task on thread {thread} failed: {source}")]
    Task {
        thread: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Task on thread {thread} panicked: {message}")]
    Panicked { thread: usize, message: String },

    #[error("Filter '{filter}' failed: {message}")]
    Filter { filter: String, message: String },

    #[error("Accumulator '{name}' has no relevant pixels to finalize")]
    EmptyAggregate { name: String },

    #[error("{slots} partial result slot(s) for {partitions} partition(s)")]
    SlotMismatch { slots: usize, partitions: usize },

    #[error("Source read failed for region {region}: {message}")]
    SourceRead { region: ImageRegion, message: String },
}

impl ComputeError {
    /// Wrap an arbitrary error raised by the task running on `thread`.
    pub fn task<E>(thread: usize, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ComputeError::Task {
            thread,
            source: error.into(),
        }
    }

    /// Thread index of the failing task, if the error came from one.
    pub fn thread(&self) -> Option<usize> {
        match self {
            ComputeError::Task { thread, .. } | ComputeError::Panicked { thread, .. } => {
                Some(*thread)
            }
            _ => None,
        }
    }
}

/// Allocation failures for per-thread partial results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Cannot allocate {threads} partial result slot(s) of {slot_bytes} bytes (limit {limit} bytes)")]
    PartialResultsExceedLimit {
        threads: usize,
        slot_bytes: usize,
        limit: usize,
    },

    #[error("Allocation of {threads} partial result slot(s) failed")]
    AllocationFailed { threads: usize },

    #[error("Cannot start a pool of {threads} worker thread(s): {message}")]
    ThreadPool { threads: usize, message: String },
}

/// Errors related to graph structure and operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Input slot {slot} does not exist on node {node_id} ({arity} slot(s))")]
    SlotOutOfRange {
        node_id: NodeId,
        slot: usize,
        arity: usize,
    },

    #[error("Input slot {slot} on node {node_id} is already connected")]
    SlotAlreadyConnected { node_id: NodeId, slot: usize },

    #[error("Input slot {slot} on node {node_id} is not connected")]
    MissingInput { node_id: NodeId, slot: usize },

    #[error("Node {0} is a source and takes no inputs")]
    SourceHasNoInputs(NodeId),

    #[error("Cycle detected in graph involving nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    #[error("Output information of node {0} has not been generated")]
    OutputInformationMissing(NodeId),
}

/// Result type alias for Tilestream operations.
pub type TilestreamResult<T> = Result<T, TilestreamError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(7).to_string(), "#7");
        assert_eq!(NodeId(3).index(), 3);
    }

    #[test]
    fn test_compute_error_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error = ComputeError::task(2, io);
        assert_eq!(error.thread(), Some(2));
        assert_eq!(error.source().map(|s| s.to_string()), Some("disk gone".to_string()));
    }

    #[test]
    fn test_conflicting_modes_message() {
        let error = ConfigurationError::ConflictingStreamingModes {
            modes: vec!["memory_budget_bytes", "division_count"],
        };
        assert!(error.to_string().contains("memory_budget_bytes, division_count"));
    }

    #[test]
    fn test_conversion_to_top_level() {
        let error: TilestreamError = RegionError::SplitIndexOutOfRange { index: 4, count: 2 }.into();
        assert!(matches!(error, TilestreamError::Region(_)));
    }
}

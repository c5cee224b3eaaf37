//! Filter module.
//!
//! Contains the filter registry and built-in filter implementations.

pub mod registry;
pub mod builtin;

pub use builtin::{
    EdgeDensityFilter, MajorityVotingFilter, PointwiseFilter, ThresholdParams, TiePolicy,
};
pub use registry::{parse_parameters, FilterFactory, FilterRegistry, RegistryEntry};

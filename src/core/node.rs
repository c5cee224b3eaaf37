//! The `ImageFilter` capability trait and filter metadata.
//!
//! A filter is described by a small set of capabilities rather than a class
//! hierarchy: it reports its output geometry, its neighborhood padding and
//! border policy, and computes one output tile at a time. Everything else
//! (region negotiation, streaming, threading) is done by the engine.

use crate::core::error::{ComputeError, ConfigurationError, RegionError, TilestreamResult};
use crate::core::neighborhood::EdgePolicy;
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::{ImageRadius, ImageRegion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category for organizing filters in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Label-map regularization and classification post-processing
    Classification,
    /// Edge maps and edge-derived features
    Edge,
    /// Per-pixel arithmetic
    Math,
    /// Measurement sinks
    Analyze,
    /// Everything else
    #[default]
    Utility,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Classification => "Classification",
            Category::Edge => "Edge",
            Category::Math => "Math",
            Category::Analyze => "Analyze",
            Category::Utility => "Utility",
        }
    }
}

/// A named, documented parameter accepted by a filter factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Key in the JSON parameter object
    pub name: String,
    /// What the parameter controls
    pub description: String,
    /// Value used when the key is absent (`null` when required)
    pub default: serde_json::Value,
}

/// Metadata describing a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterMetadata {
    /// Unique identifier (e.g., "majority_voting")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Category for listings
    pub category: Category,
    /// Detailed description
    pub description: String,
    /// Names of the input slots, in order
    pub inputs: Vec<String>,
    /// Accepted parameters
    pub parameters: Vec<ParameterSpec>,
}

impl FilterMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> FilterMetadataBuilder {
        FilterMetadataBuilder {
            metadata: FilterMetadata {
                id: id.into(),
                name: name.into(),
                category: Category::default(),
                description: String::new(),
                inputs: Vec::new(),
                parameters: Vec::new(),
            },
        }
    }

    /// Find a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Builder for [`FilterMetadata`].
pub struct FilterMetadataBuilder {
    metadata: FilterMetadata,
}

impl FilterMetadataBuilder {
    /// Set the category.
    pub fn category(mut self, category: Category) -> Self {
        self.metadata.category = category;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Add an input slot.
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.metadata.inputs.push(name.into());
        self
    }

    /// Add a parameter.
    pub fn parameter(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        default: serde_json::Value,
    ) -> Self {
        self.metadata.parameters.push(ParameterSpec {
            name: name.into(),
            description: description.into(),
            default,
        });
        self
    }

    /// Build the metadata.
    pub fn build(self) -> FilterMetadata {
        self.metadata
    }
}

/// Where a tile sits in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileContext {
    /// Index of the worker thread computing the tile.
    pub thread_index: usize,
    /// Largest region of the filter's inputs, for border handling.
    pub bounds: ImageRegion,
}

/// Check that a node received the number of inputs it declares.
pub fn check_input_count(
    filter: &str,
    expected: usize,
    got: usize,
) -> Result<(), ConfigurationError> {
    if expected != got {
        return Err(ConfigurationError::InputCount {
            filter: filter.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

/// The core trait for image-to-image filters.
///
/// # Contract
///
/// - `validate` and `output_information` run before any pixel is touched and
///   must only look at the input geometry.
/// - `threaded_generate` receives input rasters covering at least the output
///   tile padded by [`padding`](ImageFilter::padding), cropped to the input
///   extent. It must write only inside `output` and must not touch shared state.
///
/// `Send + Sync` bounds enable the same filter to serve every worker thread.
pub trait ImageFilter: Send + Sync {
    /// Get the metadata for this filter.
    fn metadata(&self) -> FilterMetadata;

    /// Number of input slots.
    fn input_count(&self) -> usize {
        self.metadata().inputs.len()
    }

    /// Validate the configuration against the input geometry.
    fn validate(&self, inputs: &[ImageInfo]) -> Result<(), ConfigurationError> {
        check_input_count(&self.metadata().id, self.input_count(), inputs.len())
    }

    /// Output geometry. Defaults to the geometry of the first input, and
    /// requires every input to share its largest region.
    fn output_information(&self, inputs: &[ImageInfo]) -> TilestreamResult<ImageInfo> {
        let id = self.metadata().id;
        let first = inputs.first().copied().ok_or(ConfigurationError::InputCount {
            filter: id.clone(),
            expected: self.input_count(),
            got: 0,
        })?;
        for other in &inputs[1..] {
            if other.largest != first.largest {
                return Err(RegionError::Incongruent {
                    node: id,
                    first: first.largest,
                    other: other.largest,
                }
                .into());
            }
        }
        Ok(first)
    }

    /// Whether the engine must scan the labels present in input 0 and pass
    /// them to [`check_present_labels`](Self::check_present_labels) before
    /// the run.
    fn needs_present_labels(&self) -> bool {
        false
    }

    /// Validate against the labels actually present in input 0.
    fn check_present_labels(&self, _labels: &BTreeSet<i64>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Neighborhood radius read around every output pixel.
    fn padding(&self) -> ImageRadius {
        ImageRadius::zero()
    }

    /// What happens to window samples outside the image.
    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::Skip
    }

    /// Compute one output tile.
    fn threaded_generate(
        &self,
        inputs: &[&Raster],
        output: &mut Raster,
        context: &TileContext,
    ) -> Result<(), ComputeError>;
}

//! Per-pixel filters: band math and thresholding.

use crate::core::error::{ComputeError, ConfigurationError, TilestreamResult};
use crate::core::node::{check_input_count, Category, FilterMetadata, ImageFilter, TileContext};
use crate::core::raster::{ComponentType, ImageInfo, Raster};
use crate::filters::registry::{parse_parameters, FilterRegistry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Register the threshold filter.
pub fn register(registry: &mut FilterRegistry) -> TilestreamResult<()> {
    registry.register(|params| {
        let params: ThresholdParams = parse_parameters("threshold", params)?;
        let filter: Box<dyn ImageFilter> = Box::new(PointwiseFilter::threshold(params));
        Ok(filter)
    })
}

/// Per-pixel function: input samples of every input, then output samples.
pub type PixelFunction = Arc<dyn Fn(&[&[f64]], &mut [f64]) + Send + Sync>;

/// Applies a function to every pixel independently, so it needs no padding.
#[derive(Clone)]
pub struct PointwiseFilter {
    metadata: FilterMetadata,
    output_bands: Option<usize>,
    component: Option<ComponentType>,
    function: PixelFunction,
}

impl fmt::Debug for PointwiseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointwiseFilter")
            .field("id", &self.metadata.id)
            .field("inputs", &self.metadata.inputs.len())
            .field("output_bands", &self.output_bands)
            .finish()
    }
}

impl PointwiseFilter {
    /// Single-input filter keeping the band count of its input.
    pub fn new<F>(id: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[&[f64]], &mut [f64]) + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            metadata: FilterMetadata::builder(id.clone(), id)
                .category(Category::Math)
                .input("image")
                .build(),
            output_bands: None,
            component: None,
            function: Arc::new(function),
        }
    }

    /// Replace the metadata; its input list sets the arity.
    pub fn with_metadata(mut self, metadata: FilterMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the output band count.
    pub fn with_output_bands(mut self, bands: usize) -> Self {
        self.output_bands = Some(bands);
        self
    }

    /// Override the output component type.
    pub fn with_component(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    /// Binary threshold of band 0 into `below` / `above`.
    pub fn threshold(params: ThresholdParams) -> Self {
        let metadata = FilterMetadata::builder("threshold", "Threshold")
            .description("Map samples below a value to one label and the rest to another")
            .category(Category::Math)
            .input("image")
            .parameter("value", "Threshold", json!(0.0))
            .parameter("below", "Output for samples below the threshold", json!(0.0))
            .parameter("above", "Output for other samples", json!(1.0))
            .build();
        Self::new("threshold", move |inputs, output| {
            let sample = inputs[0].first().copied().unwrap_or(0.0);
            output[0] = if sample < params.value {
                params.below
            } else {
                params.above
            };
        })
        .with_metadata(metadata)
        .with_output_bands(1)
    }
}

/// JSON parameters of `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdParams {
    /// Threshold.
    pub value: f64,
    /// Output for samples below `value`.
    pub below: f64,
    /// Output for the other samples.
    pub above: f64,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            value: 0.0,
            below: 0.0,
            above: 1.0,
        }
    }
}

impl ImageFilter for PointwiseFilter {
    fn metadata(&self) -> FilterMetadata {
        self.metadata.clone()
    }

    fn validate(&self, inputs: &[ImageInfo]) -> Result<(), ConfigurationError> {
        check_input_count(&self.metadata.id, self.input_count(), inputs.len())?;
        if self.output_bands == Some(0) {
            return Err(ConfigurationError::InvalidParameter {
                filter: self.metadata.id.clone(),
                parameter: "output_bands".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn output_information(&self, inputs: &[ImageInfo]) -> TilestreamResult<ImageInfo> {
        let first = inputs.first().copied().ok_or(ConfigurationError::InputCount {
            filter: self.metadata.id.clone(),
            expected: self.input_count(),
            got: 0,
        })?;
        let mut info = first;
        if let Some(bands) = self.output_bands {
            info = info.with_bands(bands);
        }
        if let Some(component) = self.component {
            info = info.with_component(component);
        }
        Ok(info)
    }

    fn threaded_generate(
        &self,
        inputs: &[&Raster],
        output: &mut Raster,
        _context: &TileContext,
    ) -> Result<(), ComputeError> {
        let region = *output.region();
        let mut samples: Vec<&[f64]> = Vec::with_capacity(inputs.len());
        for (x, y) in region.points() {
            samples.clear();
            for input in inputs {
                let pixel = input.pixel(x, y).ok_or_else(|| ComputeError::Filter {
                    filter: self.metadata.id.clone(),
                    message: format!("input does not cover ({}, {})", x, y),
                })?;
                samples.push(pixel);
            }
            if let Some(out) = output.pixel_mut(x, y) {
                (self.function)(&samples, out);
            }
        }
        Ok(())
    }
}

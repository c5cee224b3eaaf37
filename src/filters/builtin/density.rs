//! Edge density: fraction of edge pixels around every pixel of a binary map.

use crate::core::error::{ComputeError, ConfigurationError, TilestreamResult};
use crate::core::neighborhood::{EdgePolicy, Neighborhood};
use crate::core::node::{check_input_count, Category, FilterMetadata, ImageFilter, TileContext};
use crate::core::raster::{ComponentType, ImageInfo, Raster};
use crate::core::region::ImageRadius;
use crate::filters::registry::{parse_parameters, FilterRegistry};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Register the edge density filter.
pub fn register(registry: &mut FilterRegistry) -> TilestreamResult<()> {
    registry.register(|params| {
        let params: EdgeDensityParams = parse_parameters("edge_density", params)?;
        let filter: Box<dyn ImageFilter> = Box::new(EdgeDensityFilter::from_params(params));
        Ok(filter)
    })
}

/// JSON parameters of `edge_density`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdgeDensityParams {
    /// Window radius.
    pub radius: u64,
    /// Border handling.
    pub edge_policy: EdgePolicy,
}

impl Default for EdgeDensityParams {
    fn default() -> Self {
        Self {
            radius: 2,
            edge_policy: EdgePolicy::Mirror,
        }
    }
}

/// Share of non-zero samples in the `(2r + 1)²` window of each pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDensityFilter {
    params: EdgeDensityParams,
}

impl EdgeDensityFilter {
    /// Filter over a `(2 * radius + 1)` window, mirroring at the border.
    pub fn new(radius: u64) -> Self {
        Self::from_params(EdgeDensityParams {
            radius,
            ..Default::default()
        })
    }

    /// Filter configured from decoded parameters.
    pub fn from_params(params: EdgeDensityParams) -> Self {
        Self { params }
    }

    /// Set the border policy.
    pub fn with_edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.params.edge_policy = policy;
        self
    }
}

impl ImageFilter for EdgeDensityFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("edge_density", "Edge Density")
            .description("Local density of edge pixels in a binary edge map")
            .category(Category::Edge)
            .input("edges")
            .parameter("radius", "Window radius, in pixels", json!(2))
            .parameter(
                "edge_policy",
                "mirror, zero_fill, skip or keep_original",
                json!("mirror"),
            )
            .build()
    }

    fn validate(&self, inputs: &[ImageInfo]) -> Result<(), ConfigurationError> {
        check_input_count("edge_density", 1, inputs.len())?;
        if self.params.radius == 0 {
            return Err(ConfigurationError::InvalidParameter {
                filter: "edge_density".to_string(),
                parameter: "radius".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn output_information(&self, inputs: &[ImageInfo]) -> TilestreamResult<ImageInfo> {
        let first = inputs.first().copied().ok_or(ConfigurationError::InputCount {
            filter: "edge_density".to_string(),
            expected: 1,
            got: 0,
        })?;
        Ok(first.with_component(ComponentType::F32))
    }

    fn padding(&self) -> ImageRadius {
        ImageRadius::uniform(self.params.radius)
    }

    fn edge_policy(&self) -> EdgePolicy {
        self.params.edge_policy
    }

    fn threaded_generate(
        &self,
        inputs: &[&Raster],
        output: &mut Raster,
        context: &TileContext,
    ) -> Result<(), ComputeError> {
        let input = inputs[0];
        let hood = Neighborhood::new(self.padding(), self.edge_policy(), context.bounds);
        let region = *output.region();
        let mut window = Vec::with_capacity(self.padding().window_len());

        for (x, y) in region.points() {
            for band in 0..output.bands() {
                let value = if hood.gather(input, x, y, band, true, &mut window) {
                    let edges = window.iter().filter(|&&v| v != 0.0).count();
                    if window.is_empty() {
                        0.0
                    } else {
                        edges as f64 / window.len() as f64
                    }
                } else {
                    input.get(x, y, band).unwrap_or(0.0)
                };
                output.set(x, y, band, value);
            }
        }
        Ok(())
    }
}

//! Terminal consumers driven by [`Pipeline::update`](crate::execution::Pipeline::update).
//!
//! A terminal sits at the downstream end of a pipeline. It declares which
//! graph nodes it reads, receives one division at a time, and produces its
//! result once every division has been processed.

use crate::core::error::{ConfigurationError, NodeId, TilestreamResult};
use crate::core::io::save_raster;
use crate::core::node::check_input_count;
use crate::core::raster::{ComponentType, ImageInfo, Raster};
use crate::core::region::{ImageRadius, ImageRegion};
use crate::execution::dispatcher::ThreadDispatcher;
use std::path::PathBuf;

/// What a terminal gets to work with for one division.
pub struct DivisionContext<'a> {
    /// Position of the division in the plan.
    pub index: usize,
    /// Number of divisions in the plan.
    pub total: usize,
    /// Worker threads for this run.
    pub dispatcher: &'a ThreadDispatcher,
    /// Byte cap for per-thread partial results, if any.
    pub accumulator_memory_limit: Option<usize>,
}

/// The downstream end of a pipeline.
pub trait Terminal {
    /// Display name used in logs and errors.
    fn name(&self) -> &str;

    /// Graph nodes read by this terminal, in slot order.
    fn inputs(&self) -> &[NodeId];

    /// Neighborhood radius read around every output pixel.
    fn padding(&self) -> ImageRadius {
        ImageRadius::zero()
    }

    /// Validate against the input geometry. Runs before any thread starts.
    fn validate(&self, inputs: &[ImageInfo]) -> TilestreamResult<()> {
        check_input_count(self.name(), self.inputs().len(), inputs.len())?;
        Ok(())
    }

    /// Geometry of the region this terminal consumes.
    fn output_information(&self, inputs: &[ImageInfo]) -> TilestreamResult<ImageInfo> {
        inputs.first().copied().ok_or_else(|| {
            ConfigurationError::InputCount {
                filter: self.name().to_string(),
                expected: self.inputs().len(),
                got: 0,
            }
            .into()
        })
    }

    /// Called once before the first division of a run over `region`.
    fn begin(&mut self, inputs: &[ImageInfo], region: &ImageRegion) -> TilestreamResult<()>;

    /// Consume one division. `inputs` cover at least `division` padded by
    /// [`padding`](Terminal::padding). Returns the number of threads used.
    fn process_division(
        &mut self,
        division: &ImageRegion,
        inputs: &[&Raster],
        context: &DivisionContext<'_>,
    ) -> TilestreamResult<usize>;

    /// Called once after the last division.
    fn finalize(&mut self) -> TilestreamResult<()>;

    /// Discard everything produced so far after a failed run.
    fn abort(&mut self) {}
}

/// Assembles the divisions of its input into one in-memory raster, and
/// optionally encodes it to a file when the run completes.
pub struct RasterWriter {
    name: String,
    inputs: [NodeId; 1],
    path: Option<PathBuf>,
    component: ComponentType,
    canvas: Option<Raster>,
    output: Option<Raster>,
}

impl RasterWriter {
    /// Writer reading `input`.
    pub fn new(input: NodeId) -> Self {
        Self {
            name: "raster_writer".to_string(),
            inputs: [input],
            path: None,
            component: ComponentType::default(),
            canvas: None,
            output: None,
        }
    }

    /// Also encode the result to `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The assembled raster of the last successful run.
    pub fn raster(&self) -> Option<&Raster> {
        self.output.as_ref()
    }

    /// Take the assembled raster.
    pub fn into_raster(self) -> Option<Raster> {
        self.output
    }
}

impl Terminal for RasterWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    fn begin(&mut self, inputs: &[ImageInfo], region: &ImageRegion) -> TilestreamResult<()> {
        let info = self.output_information(inputs)?;
        self.component = info.component;
        self.canvas = Some(Raster::new(*region, info.bands));
        self.output = None;
        Ok(())
    }

    fn process_division(
        &mut self,
        division: &ImageRegion,
        inputs: &[&Raster],
        _context: &DivisionContext<'_>,
    ) -> TilestreamResult<usize> {
        if let (Some(canvas), Some(input)) = (self.canvas.as_mut(), inputs.first()) {
            canvas.paste(&input.crop(division));
        }
        Ok(1)
    }

    fn finalize(&mut self) -> TilestreamResult<()> {
        let Some(canvas) = self.canvas.take() else {
            return Ok(());
        };
        if let Some(path) = &self.path {
            save_raster(&canvas, self.component, path)?;
        }
        self.output = Some(canvas);
        Ok(())
    }

    fn abort(&mut self) {
        self.canvas = None;
        self.output = None;
    }
}

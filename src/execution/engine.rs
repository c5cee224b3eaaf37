//! Streaming execution engine.
//!
//! [`Pipeline::update`] runs a terminal over the graph:
//!
//! 1. validate wiring and parameters, bring output information up to date,
//!    and check filters that validate against the labels present in their
//!    input (a label-set pass over that input)
//! 2. propagate a request for the whole output upstream (region errors
//!    surface here, before any thread is spawned)
//! 3. plan the streaming divisions
//! 4. for every division, propagate its request, evaluate each node in
//!    topological order (filters fork/join across the dispatcher), and hand
//!    the terminal's input rasters to the terminal
//! 5. finalize the terminal
//!
//! Divisions run strictly one after the other.

use crate::accumulators::LabelSetAccumulator;
use crate::core::error::{GraphError, NodeId, RegionError, TilestreamError, TilestreamResult};
use crate::core::node::TileContext;
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::ImageRegion;
use crate::execution::dispatcher::ThreadDispatcher;
use crate::execution::persistent::PersistentFilter;
use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
use crate::execution::streaming::{StreamingConfig, StreamingMode, StreamingPlan};
use crate::execution::terminal::{DivisionContext, Terminal};
use crate::graph::propagation::RequestedRegionPropagator;
use crate::graph::structure::{NodeKind, PipelineGraph};
use crate::graph::topology::TopologyAnalyzer;
use crate::validation::ValidationPipeline;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution options.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Maximum number of worker threads (0 = use all available).
    pub max_threads: usize,
    /// Smallest extent, in lines, a thread partition may have.
    pub min_lines_per_thread: u64,
    /// Byte cap for the per-thread partial results of an accumulator.
    pub accumulator_memory_limit: Option<usize>,
    /// Progress callback.
    pub progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("max_threads", &self.max_threads)
            .field("min_lines_per_thread", &self.min_lines_per_thread)
            .field("accumulator_memory_limit", &self.accumulator_memory_limit)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_threads: 0, // Use all available
            min_lines_per_thread: 1,
            accumulator_memory_limit: None,
            progress_callback: None,
        }
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Set the minimum number of lines per thread partition.
    pub fn with_min_lines_per_thread(mut self, lines: u64) -> Self {
        self.min_lines_per_thread = lines;
        self
    }

    /// Cap the memory of per-thread partial results, in bytes.
    pub fn with_accumulator_memory_limit(mut self, bytes: usize) -> Self {
        self.accumulator_memory_limit = Some(bytes);
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Number of streaming divisions processed.
    pub divisions: usize,
    /// How the division count was chosen.
    pub mode: StreamingMode,
    /// Threads used by the terminal for each division.
    pub threads_per_division: Vec<usize>,
    /// Pixels in the requested region.
    pub pixels: u64,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// A graph plus everything needed to stream it.
pub struct Pipeline {
    graph: PipelineGraph,
    streaming: StreamingConfig,
    options: ExecutionOptions,
    validation: ValidationPipeline,
    tracker: Arc<ProgressTracker>,
}

impl Pipeline {
    /// Stream `graph` with default settings.
    pub fn new(graph: PipelineGraph) -> Self {
        Self {
            graph,
            streaming: StreamingConfig::default(),
            options: ExecutionOptions::default(),
            validation: ValidationPipeline::default(),
            tracker: ProgressTracker::new_shared(),
        }
    }

    /// Set the streaming configuration.
    pub fn with_streaming(mut self, streaming: StreamingConfig) -> Self {
        self.streaming = streaming;
        self
    }

    /// Set execution options. Replaces the progress tracker.
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        let mut tracker = ProgressTracker::new();
        if let Some(callback) = &options.progress_callback {
            tracker = tracker.with_callback(Arc::clone(callback));
        }
        self.tracker = Arc::new(tracker);
        self.options = options;
        self
    }

    /// Set the validation stages run before every update.
    pub fn with_validation(mut self, validation: ValidationPipeline) -> Self {
        self.validation = validation;
        self
    }

    /// The graph.
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Mutable access to the graph.
    pub fn graph_mut(&mut self) -> &mut PipelineGraph {
        &mut self.graph
    }

    /// Streaming configuration.
    pub fn streaming(&self) -> &StreamingConfig {
        &self.streaming
    }

    /// Replace the streaming configuration.
    pub fn set_streaming(&mut self, streaming: StreamingConfig) {
        self.streaming = streaming;
    }

    /// Execution options.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Shared progress tracker. Cancelling it stops the current run before
    /// its next division, and every later run until the tracker is reset.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Validate and bring the output information of the terminal's inputs up
    /// to date. Returns the input information in slot order.
    fn prepare(&mut self, terminal: &dyn Terminal) -> TilestreamResult<Vec<ImageInfo>> {
        self.validation.validate(&self.graph, terminal)?;
        let mut infos = Vec::with_capacity(terminal.inputs().len());
        for &input in terminal.inputs() {
            infos.push(self.graph.update_output_information(input)?);
        }
        terminal.validate(&infos)?;
        Ok(infos)
    }

    /// Run a label-set pass over the input of every upstream filter that
    /// validates against the labels actually present, and validate it.
    fn check_present_labels(&mut self, terminal: &dyn Terminal) -> TilestreamResult<()> {
        let order = TopologyAnalyzer::new(&self.graph).upstream_order(terminal.inputs())?;
        let mut pending = Vec::new();
        for id in order {
            let node = self.graph.get_node(id)?;
            if let NodeKind::Filter(filter) = node.kind() {
                if filter.needs_present_labels() {
                    if let Some(&input) = node.connected_inputs()?.first() {
                        pending.push((id, input));
                    }
                }
            }
        }

        for (id, input) in pending {
            let mut scan = PersistentFilter::new(LabelSetAccumulator::new(), &[input]);
            self.update(&mut scan)?;
            let labels = scan.take_result().unwrap_or_default();
            let node = self.graph.get_node(id)?;
            log::debug!("{}: input holds {} label(s)", node.display_name(), labels.len());
            if let NodeKind::Filter(filter) = node.kind() {
                filter.check_present_labels(&labels)?;
            }
        }
        Ok(())
    }

    /// Division layout an update of `terminal` would use.
    pub fn plan(&mut self, terminal: &dyn Terminal) -> TilestreamResult<StreamingPlan> {
        let infos = self.prepare(terminal)?;
        let region = terminal.output_information(&infos)?.largest;
        Ok(StreamingPlan::new(&self.streaming, region, footprint(&infos))?)
    }

    /// Stream the whole output of `terminal`.
    pub fn update(&mut self, terminal: &mut dyn Terminal) -> TilestreamResult<RunReport> {
        let infos = self.prepare(terminal)?;
        self.check_present_labels(terminal)?;
        let region = terminal.output_information(&infos)?.largest;
        self.run(terminal, &infos, region)
    }

    /// Stream `region` of the output of `terminal`.
    pub fn update_region(
        &mut self,
        terminal: &mut dyn Terminal,
        region: ImageRegion,
    ) -> TilestreamResult<RunReport> {
        let infos = self.prepare(terminal)?;
        let largest = terminal.output_information(&infos)?.largest;
        if !region.is_empty() && !largest.contains(&region) {
            return Err(RegionError::OutOfBounds {
                requested: region,
                largest,
            }
            .into());
        }
        self.check_present_labels(terminal)?;
        self.run(terminal, &infos, region)
    }

    fn run(
        &self,
        terminal: &mut dyn Terminal,
        infos: &[ImageInfo],
        region: ImageRegion,
    ) -> TilestreamResult<RunReport> {
        let start = Instant::now();
        let plan = StreamingPlan::new(&self.streaming, region, footprint(infos))?;

        if plan.division_count() == 0 {
            log::info!("'{}': requested region {} is empty, nothing to do", terminal.name(), region);
            return Ok(RunReport {
                divisions: 0,
                mode: plan.mode(),
                threads_per_division: Vec::new(),
                pixels: 0,
                elapsed: start.elapsed(),
            });
        }

        // Whole-output preflight: incongruent inputs fail here, before the
        // terminal or any worker thread is involved.
        let propagator = RequestedRegionPropagator::new(&self.graph);
        let seeds = propagator.request_inputs(terminal.name(), terminal.inputs(), &region, &terminal.padding())?;
        propagator.propagate(&seeds)?;

        let dispatcher = ThreadDispatcher::new(self.options.max_threads, self.options.min_lines_per_thread)?;
        log::info!(
            "'{}': streaming {} in {} division(s), mode {}, up to {} thread(s)",
            terminal.name(),
            region,
            plan.division_count(),
            plan.mode(),
            dispatcher.max_threads()
        );

        terminal.begin(infos, &region)?;
        match self.stream(terminal, &plan, &dispatcher) {
            Ok(threads_per_division) => {
                self.tracker.complete();
                let report = RunReport {
                    divisions: plan.division_count(),
                    mode: plan.mode(),
                    threads_per_division,
                    pixels: region.pixel_count(),
                    elapsed: start.elapsed(),
                };
                log::info!(
                    "'{}': {} division(s) done in {:?}",
                    terminal.name(),
                    report.divisions,
                    report.elapsed
                );
                Ok(report)
            }
            Err(error) => {
                terminal.abort();
                self.tracker.report_error(error.to_string());
                log::error!("'{}': run failed: {}", terminal.name(), error);
                Err(error)
            }
        }
    }

    fn stream(
        &self,
        terminal: &mut dyn Terminal,
        plan: &StreamingPlan,
        dispatcher: &ThreadDispatcher,
    ) -> TilestreamResult<Vec<usize>> {
        let total = plan.division_count();
        self.tracker.start(total);
        let mut threads_per_division = Vec::with_capacity(total);

        for index in 0..total {
            if self.tracker.is_cancelled() {
                return Err(TilestreamError::Cancelled {
                    completed: index,
                    total,
                });
            }
            let division = plan.division(index)?;
            let started = Instant::now();
            self.tracker.division_started(index, division);
            log::debug!("Division {}/{}: {}", index + 1, total, division);

            let buffers = self.evaluate(terminal, &division, dispatcher)?;
            let inputs = terminal
                .inputs()
                .iter()
                .map(|id| buffers.get(id).ok_or(GraphError::OutputInformationMissing(*id)))
                .collect::<Result<Vec<&Raster>, _>>()?;
            let context = DivisionContext {
                index,
                total,
                dispatcher,
                accumulator_memory_limit: self.options.accumulator_memory_limit,
            };
            let threads = terminal.process_division(&division, &inputs, &context)?;

            threads_per_division.push(threads);
            self.tracker
                .division_completed(index, started.elapsed().as_millis() as u64, threads);
        }
        terminal.finalize()?;
        Ok(threads_per_division)
    }

    /// Produce the requested region of every node upstream of `terminal`
    /// for one division.
    fn evaluate(
        &self,
        terminal: &dyn Terminal,
        division: &ImageRegion,
        dispatcher: &ThreadDispatcher,
    ) -> TilestreamResult<BTreeMap<NodeId, Raster>> {
        let propagator = RequestedRegionPropagator::new(&self.graph);
        let seeds = propagator.request_inputs(terminal.name(), terminal.inputs(), division, &terminal.padding())?;
        let requests = propagator.propagate(&seeds)?;

        let mut buffers: BTreeMap<NodeId, Raster> = BTreeMap::new();
        for &id in requests.order() {
            let Some(region) = requests.get(id).copied() else {
                continue;
            };
            let node = self.graph.get_node(id)?;
            let raster = match node.kind() {
                NodeKind::Source(source) => source.read(&region)?,
                NodeKind::Filter(filter) => {
                    let upstream = node.connected_inputs()?;
                    let inputs = upstream
                        .iter()
                        .map(|input| buffers.get(input).ok_or(GraphError::OutputInformationMissing(*input)))
                        .collect::<Result<Vec<&Raster>, _>>()?;
                    let bounds = match upstream.first() {
                        Some(&first) => self.graph.information(first)?.largest,
                        None => self.graph.information(id)?.largest,
                    };
                    let bands = self.graph.information(id)?.bands;

                    let partitions = dispatcher.partition(&region);
                    let tiles = dispatcher.run(&partitions, |thread_index, partition| {
                        let mut tile = Raster::new(*partition, bands);
                        let context = TileContext { thread_index, bounds };
                        filter.threaded_generate(&inputs, &mut tile, &context)?;
                        Ok(tile)
                    })?;

                    let mut output = Raster::new(region, bands);
                    for tile in &tiles {
                        output.paste(tile);
                    }
                    output
                }
            };
            log::trace!("Evaluated {} over {}", node.display_name(), region);
            buffers.insert(id, raster);
        }
        Ok(buffers)
    }
}

/// Bytes buffered per pixel of a division: the sum of the terminal's inputs.
fn footprint(infos: &[ImageInfo]) -> usize {
    infos.iter().map(ImageInfo::footprint).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ComputeError;
    use crate::core::neighborhood::{EdgePolicy, Neighborhood};
    use crate::core::node::{FilterMetadata, ImageFilter};
    use crate::core::raster::ComponentType;
    use crate::core::region::ImageRadius;
    use crate::core::source::{ConstantSource, ImageSource, SyntheticSource};
    use crate::execution::terminal::RasterWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sum over a (2r+1)² window, skipping samples outside the image.
    struct BoxSum {
        radius: u64,
    }

    impl ImageFilter for BoxSum {
        fn metadata(&self) -> FilterMetadata {
            FilterMetadata::builder("box_sum", "Box Sum").input("image").build()
        }

        fn padding(&self) -> ImageRadius {
            ImageRadius::uniform(self.radius)
        }

        fn threaded_generate(
            &self,
            inputs: &[&Raster],
            output: &mut Raster,
            context: &TileContext,
        ) -> Result<(), ComputeError> {
            let hood = Neighborhood::new(self.padding(), EdgePolicy::Skip, context.bounds);
            let mut window = Vec::new();
            let region = *output.region();
            for (x, y) in region.points() {
                hood.gather(inputs[0], x, y, 0, true, &mut window);
                output.set(x, y, 0, window.iter().sum());
            }
            Ok(())
        }
    }

    /// Fails on every tile.
    struct Broken;

    impl ImageFilter for Broken {
        fn metadata(&self) -> FilterMetadata {
            FilterMetadata::builder("broken", "Broken").input("image").build()
        }

        fn threaded_generate(
            &self,
            _inputs: &[&Raster],
            _output: &mut Raster,
            context: &TileContext,
        ) -> Result<(), ComputeError> {
            Err(ComputeError::task(
                context.thread_index,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt tile"),
            ))
        }
    }

    /// Counts how often it is read.
    struct Counting {
        info: ImageInfo,
        reads: Arc<AtomicUsize>,
    }

    impl ImageSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn info(&self) -> ImageInfo {
            self.info
        }

        fn read(&self, region: &ImageRegion) -> Result<Raster, ComputeError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Raster::new(region.crop(&self.info.largest), self.info.bands))
        }
    }

    fn ramp(width: u64, height: u64) -> SyntheticSource {
        let info = ImageInfo::new(width, height, 1, ComponentType::U16);
        SyntheticSource::new(info, move |x, y, _| (y * width as i64 + x) as f64)
    }

    fn box_sum_reference(width: u64, height: u64, radius: i64) -> Vec<f64> {
        let mut expected = Vec::new();
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                let mut sum = 0.0;
                for ny in (y - radius).max(0)..=(y + radius).min(height as i64 - 1) {
                    for nx in (x - radius).max(0)..=(x + radius).min(width as i64 - 1) {
                        sum += (ny * width as i64 + nx) as f64;
                    }
                }
                expected.push(sum);
            }
        }
        expected
    }

    #[test]
    fn test_options_builder() {
        let options = ExecutionOptions::new()
            .with_max_threads(3)
            .with_min_lines_per_thread(8)
            .with_accumulator_memory_limit(1024)
            .with_progress(|_| {});
        assert_eq!(options.max_threads, 3);
        assert_eq!(options.min_lines_per_thread, 8);
        assert_eq!(options.accumulator_memory_limit, Some(1024));
        assert!(format!("{:?}", options).contains("<callback>"));
    }

    #[test]
    fn test_streamed_neighborhood_matches_whole_image() {
        let (width, height) = (23, 37);
        let expected = box_sum_reference(width, height, 2);

        for streaming in [
            StreamingConfig::new().with_lines_per_division(5),
            StreamingConfig::new().with_tile_size(8),
            StreamingConfig::new().with_division_count(1),
        ] {
            let mut graph = PipelineGraph::new();
            let source = graph.add_source(ramp(width, height));
            let filter = graph.add_filter(BoxSum { radius: 2 });
            graph.connect(source, filter, 0).unwrap();
            let mut pipeline = Pipeline::new(graph)
                .with_streaming(streaming)
                .with_options(ExecutionOptions::new().with_max_threads(3));

            let mut writer = RasterWriter::new(filter);
            let report = pipeline.update(&mut writer).unwrap();
            assert!(report.divisions >= 1);
            assert_eq!(report.pixels, width * height);
            assert_eq!(writer.raster().unwrap().data(), expected.as_slice());
        }
    }

    #[test]
    fn test_empty_region_is_a_no_op() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(Counting {
            info: ImageInfo::new(100, 100, 1, ComponentType::U8),
            reads: reads.clone(),
        });
        let mut pipeline = Pipeline::new(graph);
        let mut writer = RasterWriter::new(source);
        let report = pipeline
            .update_region(&mut writer, ImageRegion::rect(0, 0, 100, 0))
            .unwrap();
        assert_eq!(report.divisions, 0);
        assert_eq!(report.pixels, 0);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert!(writer.raster().is_none());
    }

    #[test]
    fn test_out_of_bounds_region_is_rejected() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::new(10, 10, ComponentType::U8, 1.0));
        let mut pipeline = Pipeline::new(graph);
        let mut writer = RasterWriter::new(source);
        let error = pipeline
            .update_region(&mut writer, ImageRegion::rect(5, 5, 10, 10))
            .unwrap_err();
        assert!(matches!(error, TilestreamError::Region(RegionError::OutOfBounds { .. })));
    }

    #[test]
    fn test_sub_region_update() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ramp(10, 10));
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_lines_per_division(2));
        let mut writer = RasterWriter::new(source);
        let region = ImageRegion::rect(2, 3, 4, 5);
        let report = pipeline.update_region(&mut writer, region).unwrap();
        assert_eq!(report.divisions, 3);
        let raster = writer.raster().unwrap();
        assert_eq!(*raster.region(), region);
        assert_eq!(raster.get(2, 3, 0), Some(32.0));
        assert_eq!(raster.get(5, 7, 0), Some(75.0));
    }

    #[test]
    fn test_compute_error_aborts_the_run() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::new(16, 16, ComponentType::U8, 1.0));
        let filter = graph.add_filter(Broken);
        graph.connect(source, filter, 0).unwrap();
        let mut pipeline = Pipeline::new(graph);
        let mut writer = RasterWriter::new(filter);
        let error = pipeline.update(&mut writer).unwrap_err();
        match error {
            TilestreamError::Compute(compute) => {
                assert!(compute.to_string().contains("corrupt tile"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(writer.raster().is_none());
    }

    #[test]
    fn test_incongruent_inputs_fail_before_reading() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut graph = PipelineGraph::new();
        let a = graph.add_source(Counting {
            info: ImageInfo::new(100, 100, 1, ComponentType::U8),
            reads: reads.clone(),
        });
        let b = graph.add_source(Counting {
            info: ImageInfo::new(80, 100, 1, ComponentType::U8),
            reads: reads.clone(),
        });

        /// Reads two inputs; keeps the first input's geometry.
        struct Pair {
            inputs: [NodeId; 2],
            begun: bool,
        }

        impl Terminal for Pair {
            fn name(&self) -> &str {
                "pair"
            }

            fn inputs(&self) -> &[NodeId] {
                &self.inputs
            }

            fn begin(&mut self, _inputs: &[ImageInfo], _region: &ImageRegion) -> TilestreamResult<()> {
                self.begun = true;
                Ok(())
            }

            fn process_division(
                &mut self,
                _division: &ImageRegion,
                _inputs: &[&Raster],
                _context: &DivisionContext<'_>,
            ) -> TilestreamResult<usize> {
                Ok(1)
            }

            fn finalize(&mut self) -> TilestreamResult<()> {
                Ok(())
            }
        }

        let mut pipeline = Pipeline::new(graph);
        let mut pair = Pair {
            inputs: [a, b],
            begun: false,
        };
        let error = pipeline.update(&mut pair).unwrap_err();
        assert!(matches!(error, TilestreamError::Region(RegionError::Incongruent { .. })));
        assert!(!pair.begun);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancellation_between_divisions() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::new(8, 8, ComponentType::U8, 1.0));
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_division_count(4));

        /// Cancels the run from inside the first division.
        struct Cancelling {
            inputs: [NodeId; 1],
            tracker: Arc<ProgressTracker>,
            processed: usize,
            aborted: bool,
        }

        impl Terminal for Cancelling {
            fn name(&self) -> &str {
                "cancelling"
            }

            fn inputs(&self) -> &[NodeId] {
                &self.inputs
            }

            fn begin(&mut self, _inputs: &[ImageInfo], _region: &ImageRegion) -> TilestreamResult<()> {
                Ok(())
            }

            fn process_division(
                &mut self,
                _division: &ImageRegion,
                _inputs: &[&Raster],
                _context: &DivisionContext<'_>,
            ) -> TilestreamResult<usize> {
                self.processed += 1;
                self.tracker.cancel();
                Ok(1)
            }

            fn finalize(&mut self) -> TilestreamResult<()> {
                Ok(())
            }

            fn abort(&mut self) {
                self.aborted = true;
            }
        }

        let mut terminal = Cancelling {
            inputs: [source],
            tracker: pipeline.progress(),
            processed: 0,
            aborted: false,
        };
        let error = pipeline.update(&mut terminal).unwrap_err();
        assert!(matches!(
            error,
            TilestreamError::Cancelled {
                completed: 1,
                total: 4
            }
        ));
        assert_eq!(terminal.processed, 1);
        assert!(terminal.aborted);
    }

    #[test]
    fn test_cancel_before_update() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::new(8, 8, ComponentType::U8, 1.0));
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_division_count(4));
        let mut writer = RasterWriter::new(source);

        pipeline.progress().cancel();
        let error = pipeline.update(&mut writer).unwrap_err();
        assert!(matches!(
            error,
            TilestreamError::Cancelled {
                completed: 0,
                total: 4
            }
        ));
        assert!(writer.raster().is_none());

        pipeline.progress().reset();
        let report = pipeline.update(&mut writer).unwrap();
        assert_eq!(report.divisions, 4);
        assert!(writer.raster().is_some());
    }

    #[test]
    fn test_progress_events() {
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        let options = ExecutionOptions::new().with_progress(move |update| {
            let name = match update {
                ProgressUpdate::Started { .. } => "started",
                ProgressUpdate::DivisionStarted { .. } => "division_started",
                ProgressUpdate::DivisionCompleted { .. } => "division_completed",
                ProgressUpdate::Progress { .. } => "progress",
                ProgressUpdate::Completed { .. } => "completed",
                ProgressUpdate::Cancelled => "cancelled",
                ProgressUpdate::Error { .. } => "error",
            };
            sink.lock().push(name);
        });

        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::new(4, 4, ComponentType::U8, 1.0));
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_division_count(2))
            .with_options(options);
        pipeline.update(&mut RasterWriter::new(source)).unwrap();

        let events = events.lock();
        assert_eq!(events.first(), Some(&"started"));
        assert_eq!(events.last(), Some(&"completed"));
        assert_eq!(events.iter().filter(|e| **e == "division_completed").count(), 2);
    }

    #[test]
    fn test_plan_uses_input_footprint() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::with_bands(
            100,
            100,
            ComponentType::U16,
            vec![0.0, 0.0],
        ));
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_memory_budget(4_000));
        let plan = pipeline.plan(&RasterWriter::new(source)).unwrap();
        // 100 px × 4 bytes = 400 bytes per row, 10 rows per division.
        assert_eq!(plan.division_count(), 10);
    }
}

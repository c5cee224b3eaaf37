//! The Before/Threaded/After accumulation life-cycle.
//!
//! A [`PersistentFilter`] wraps an [`Accumulator`] and runs it over every
//! division of a streaming run:
//!
//! ```text
//! Idle -> RegionPropagated -> { BeforeDivision -> ThreadedCompute -> Merge }* -> Finalized -> Idle
//! ```
//!
//! Before each division one partial result per thread is allocated and set
//! to the accumulator's identity. Each thread then updates only its own slot.
//! After the join the slots are merged into the global aggregate in
//! ascending thread order, so floating-point sums are reproducible.

use crate::core::error::{
    ComputeError, NodeId, ResourceError, TilestreamError, TilestreamResult,
};
use crate::core::node::check_input_count;
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::{ImageRadius, ImageRegion};
use crate::execution::terminal::{DivisionContext, Terminal};
use serde::Serialize;
use std::fmt;

/// A mergeable, thread-partitioned aggregate.
pub trait Accumulator: Send + Sync {
    /// Thread-private partial result.
    type Partial: Send;
    /// Final result.
    type Output;

    /// Display name used in logs and errors.
    fn name(&self) -> &str;

    /// Number of input images.
    fn input_count(&self) -> usize {
        1
    }

    /// Validate against the input geometry. Runs before any thread starts.
    fn validate(&self, inputs: &[ImageInfo]) -> TilestreamResult<()> {
        check_input_count(self.name(), self.input_count(), inputs.len())?;
        Ok(())
    }

    /// Neighborhood radius read around every pixel.
    fn padding(&self) -> ImageRadius {
        ImageRadius::zero()
    }

    /// Clear the global aggregate at the start of a run.
    fn reset(&mut self, inputs: &[ImageInfo]) -> TilestreamResult<()>;

    /// A fresh partial result (zero sums, +inf min, -inf max, empty counts).
    fn identity(&self) -> Self::Partial;

    /// Approximate bytes held by one partial result.
    fn partial_footprint(&self) -> usize {
        std::mem::size_of::<Self::Partial>()
    }

    /// Fold the pixels of `partition` into `partial`.
    ///
    /// Must not read outside `partition`.
    fn accumulate(
        &self,
        inputs: &[&Raster],
        partition: &ImageRegion,
        partial: &mut Self::Partial,
    ) -> Result<(), ComputeError>;

    /// Merge one partial result into the global aggregate.
    fn merge(&mut self, partial: Self::Partial);

    /// Derive the final result from the global aggregate.
    fn finalize(&mut self) -> Result<Self::Output, ComputeError>;
}

/// Life-cycle state of a persistent filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No run in progress.
    Idle,
    /// Requests propagated, aggregate reset.
    RegionPropagated,
    /// Partial results allocated for the current division.
    BeforeDivision,
    /// Worker threads running.
    ThreadedCompute,
    /// Partial results being merged.
    Merge,
    /// Result derived; the filter returns to `Idle` with the result kept.
    Finalized,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::RegionPropagated => "region_propagated",
            PipelineState::BeforeDivision => "before_division",
            PipelineState::ThreadedCompute => "threaded_compute",
            PipelineState::Merge => "merge",
            PipelineState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Terminal that streams its inputs through an [`Accumulator`].
pub struct PersistentFilter<A: Accumulator> {
    accumulator: A,
    inputs: Vec<NodeId>,
    state: PipelineState,
    slots: Vec<A::Partial>,
    result: Option<A::Output>,
}

impl<A: Accumulator> PersistentFilter<A> {
    /// Accumulate over `inputs` (one node per accumulator input).
    pub fn new(accumulator: A, inputs: &[NodeId]) -> Self {
        Self {
            accumulator,
            inputs: inputs.to_vec(),
            state: PipelineState::Idle,
            slots: Vec::new(),
            result: None,
        }
    }

    /// The wrapped accumulator.
    pub fn accumulator(&self) -> &A {
        &self.accumulator
    }

    /// Mutable access to the accumulator's parameters between runs.
    pub fn accumulator_mut(&mut self) -> &mut A {
        &mut self.accumulator
    }

    /// Current life-cycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Result of the last successful run.
    pub fn result(&self) -> Option<&A::Output> {
        self.result.as_ref()
    }

    /// Take the result of the last successful run.
    pub fn take_result(&mut self) -> Option<A::Output> {
        self.result.take()
    }

    fn transition(&mut self, next: PipelineState) {
        log::trace!("{}: {} -> {}", self.accumulator.name(), self.state, next);
        self.state = next;
    }

    /// Allocate one identity partial result per thread.
    fn before_threaded_generate(
        &mut self,
        threads: usize,
        limit: Option<usize>,
    ) -> Result<(), ResourceError> {
        let slot_bytes = self.accumulator.partial_footprint();
        if let Some(limit) = limit {
            if threads.saturating_mul(slot_bytes) > limit {
                return Err(ResourceError::PartialResultsExceedLimit {
                    threads,
                    slot_bytes,
                    limit,
                });
            }
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(threads)
            .map_err(|_| ResourceError::AllocationFailed { threads })?;
        slots.extend((0..threads).map(|_| self.accumulator.identity()));
        self.slots = slots;
        self.transition(PipelineState::BeforeDivision);
        Ok(())
    }

    /// Merge every slot in ascending thread order.
    fn after_threaded_generate(&mut self) {
        self.transition(PipelineState::Merge);
        for partial in self.slots.drain(..) {
            self.accumulator.merge(partial);
        }
    }
}

impl<A: Accumulator> Terminal for PersistentFilter<A> {
    fn name(&self) -> &str {
        self.accumulator.name()
    }

    fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    fn padding(&self) -> ImageRadius {
        self.accumulator.padding()
    }

    fn validate(&self, inputs: &[ImageInfo]) -> TilestreamResult<()> {
        check_input_count(self.name(), self.accumulator.input_count(), self.inputs.len())?;
        self.accumulator.validate(inputs)
    }

    fn begin(&mut self, inputs: &[ImageInfo], _region: &ImageRegion) -> TilestreamResult<()> {
        self.result = None;
        self.slots.clear();
        self.accumulator.reset(inputs)?;
        self.transition(PipelineState::RegionPropagated);
        Ok(())
    }

    fn process_division(
        &mut self,
        division: &ImageRegion,
        inputs: &[&Raster],
        context: &DivisionContext<'_>,
    ) -> TilestreamResult<usize> {
        let dispatcher = context.dispatcher;
        let mut cap = dispatcher.thread_count(division);
        let partitions = loop {
            let partitions = dispatcher.partition_capped(division, cap);
            match self.before_threaded_generate(partitions.len(), context.accumulator_memory_limit) {
                Ok(()) => break partitions,
                Err(error) if partitions.len() > 1 => {
                    cap = partitions.len() / 2;
                    log::warn!(
                        "{}: {}; retrying division {} with {} thread(s)",
                        self.accumulator.name(),
                        error,
                        context.index,
                        cap
                    );
                }
                Err(error) => return Err(TilestreamError::Resource(error)),
            }
        };

        self.transition(PipelineState::ThreadedCompute);
        let accumulator = &self.accumulator;
        context
            .dispatcher
            .run_with_slots(&partitions, &mut self.slots, |_, partition, slot| {
                accumulator.accumulate(inputs, partition, slot)
            })?;

        self.after_threaded_generate();
        Ok(partitions.len())
    }

    fn finalize(&mut self) -> TilestreamResult<()> {
        let output = self.accumulator.finalize()?;
        self.result = Some(output);
        self.transition(PipelineState::Finalized);
        self.transition(PipelineState::Idle);
        Ok(())
    }

    fn abort(&mut self) {
        self.slots.clear();
        self.result = None;
        self.transition(PipelineState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::ComponentType;
    use crate::execution::dispatcher::ThreadDispatcher;

    /// Counts pixels and records the order partials were merged in.
    #[derive(Default)]
    struct Counter {
        total: u64,
        merged: Vec<u64>,
    }

    impl Accumulator for Counter {
        type Partial = u64;
        type Output = (u64, Vec<u64>);

        fn name(&self) -> &str {
            "counter"
        }

        fn reset(&mut self, _inputs: &[ImageInfo]) -> TilestreamResult<()> {
            self.total = 0;
            self.merged.clear();
            Ok(())
        }

        fn identity(&self) -> u64 {
            0
        }

        fn partial_footprint(&self) -> usize {
            1024
        }

        fn accumulate(
            &self,
            _inputs: &[&Raster],
            partition: &ImageRegion,
            partial: &mut u64,
        ) -> Result<(), ComputeError> {
            *partial += partition.pixel_count();
            Ok(())
        }

        fn merge(&mut self, partial: u64) {
            self.total += partial;
            self.merged.push(partial);
        }

        fn finalize(&mut self) -> Result<Self::Output, ComputeError> {
            Ok((self.total, self.merged.clone()))
        }
    }

    fn run(filter: &mut PersistentFilter<Counter>, limit: Option<usize>) -> TilestreamResult<usize> {
        let dispatcher = ThreadDispatcher::new(4, 1)?;
        let info = ImageInfo::new(3, 100, 1, ComponentType::U8);
        let region = info.largest;
        filter.begin(&[info], &region)?;
        let input = Raster::new(region, 1);
        let context = DivisionContext {
            index: 0,
            total: 1,
            dispatcher: &dispatcher,
            accumulator_memory_limit: limit,
        };
        let threads = filter.process_division(&region, &[&input], &context)?;
        filter.finalize()?;
        Ok(threads)
    }

    #[test]
    fn test_life_cycle_and_ordered_merge() {
        let mut filter = PersistentFilter::new(Counter::default(), &[NodeId(0)]);
        assert_eq!(filter.state(), PipelineState::Idle);
        assert_eq!(run(&mut filter, None).unwrap(), 4);
        assert_eq!(filter.state(), PipelineState::Idle);
        let (total, merged) = filter.result().unwrap();
        assert_eq!(*total, 300);
        assert_eq!(merged, &vec![75, 75, 75, 75]);
    }

    #[test]
    fn test_consecutive_updates_restart_from_idle() {
        use crate::core::source::ConstantSource;
        use crate::execution::{Pipeline, StreamingConfig};
        use crate::graph::PipelineGraph;

        let mut graph = PipelineGraph::new();
        let source = graph.add_source(ConstantSource::new(3, 10, ComponentType::U8, 1.0));
        let mut pipeline =
            Pipeline::new(graph).with_streaming(StreamingConfig::new().with_division_count(2));
        let mut filter = PersistentFilter::new(Counter::default(), &[source]);

        for _ in 0..2 {
            pipeline.update(&mut filter).unwrap();
            assert_eq!(filter.state(), PipelineState::Idle);
            let (total, _) = filter.result().unwrap();
            assert_eq!(*total, 30);
        }
    }

    #[test]
    fn test_resource_fallback_halves_threads() {
        let mut filter = PersistentFilter::new(Counter::default(), &[NodeId(0)]);
        assert_eq!(run(&mut filter, Some(2048)).unwrap(), 2);
        assert_eq!(filter.result().unwrap().0, 300);
    }

    #[test]
    fn test_resource_error_when_one_slot_does_not_fit() {
        let mut filter = PersistentFilter::new(Counter::default(), &[NodeId(0)]);
        let error = run(&mut filter, Some(100)).unwrap_err();
        assert!(matches!(
            error,
            TilestreamError::Resource(ResourceError::PartialResultsExceedLimit { threads: 1, .. })
        ));
        filter.abort();
        assert_eq!(filter.state(), PipelineState::Idle);
        assert!(filter.result().is_none());
    }

    #[test]
    fn test_validate_checks_wiring() {
        let filter = PersistentFilter::new(Counter::default(), &[NodeId(0), NodeId(1)]);
        let info = ImageInfo::new(3, 3, 1, ComponentType::U8);
        assert!(filter.validate(&[info, info]).is_err());
    }
}

//! Requested-region negotiation.
//!
//! A consumer asks each of its inputs for its own requested region padded by
//! its neighborhood radius and cropped to what the input can produce. The
//! request then travels further upstream the same way until it reaches the
//! sources. A node read by several consumers is asked for the bounding box of
//! all their requests.

use crate::core::error::{NodeId, RegionError, TilestreamResult};
use crate::core::region::{ImageRadius, ImageRegion};
use crate::graph::structure::PipelineGraph;
use crate::graph::topology::TopologyAnalyzer;
use std::collections::BTreeMap;

/// `crop(pad(output, padding), upstream_largest)`.
///
/// Pure: the same arguments always yield the same region, so padding never
/// accumulates across repeated calls.
pub fn compute_input_region(
    output: &ImageRegion,
    padding: &ImageRadius,
    upstream_largest: &ImageRegion,
) -> ImageRegion {
    output.pad(padding).crop(upstream_largest)
}

/// Requested region of every node involved in producing a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestedRegions {
    regions: BTreeMap<NodeId, ImageRegion>,
    order: Vec<NodeId>,
}

impl RequestedRegions {
    /// Requested region of `id`, if it takes part.
    pub fn get(&self, id: NodeId) -> Option<&ImageRegion> {
        self.regions.get(&id)
    }

    /// Nodes in evaluation order (sources first).
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of nodes with a request.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no node takes part.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Walks a graph upstream turning output requests into input requests.
pub struct RequestedRegionPropagator<'a> {
    graph: &'a PipelineGraph,
}

impl<'a> RequestedRegionPropagator<'a> {
    /// Propagator over a graph whose output information is up to date.
    pub fn new(graph: &'a PipelineGraph) -> Self {
        Self { graph }
    }

    /// Regions a consumer named `name` must request from `inputs` to produce
    /// `output` with the given `padding`.
    ///
    /// Every input must be asked for the same region; a differently shaped
    /// request is a [`RegionError::Incongruent`].
    pub fn request_inputs(
        &self,
        name: &str,
        inputs: &[NodeId],
        output: &ImageRegion,
        padding: &ImageRadius,
    ) -> TilestreamResult<Vec<(NodeId, ImageRegion)>> {
        let mut requests = Vec::with_capacity(inputs.len());
        for &input in inputs {
            let largest = self.graph.information(input)?.largest;
            let region = compute_input_region(output, padding, &largest);
            if let Some((_, first)) = requests.first() {
                if !region.is_congruent(first) {
                    return Err(RegionError::Incongruent {
                        node: name.to_string(),
                        first: *first,
                        other: region,
                    }
                    .into());
                }
            }
            requests.push((input, region));
        }
        Ok(requests)
    }

    /// Propagate `seeds` (node, requested output region) to every upstream node.
    pub fn propagate(&self, seeds: &[(NodeId, ImageRegion)]) -> TilestreamResult<RequestedRegions> {
        let roots: Vec<NodeId> = seeds.iter().map(|(id, _)| *id).collect();
        let order = TopologyAnalyzer::new(self.graph).upstream_order(&roots)?;

        let mut regions: BTreeMap<NodeId, ImageRegion> = BTreeMap::new();
        for &(id, region) in seeds {
            let entry = regions.entry(id).or_insert_with(ImageRegion::empty);
            *entry = entry.union(&region);
        }

        // Downstream first, so every consumer of a node has been visited
        // before the node itself forwards its request.
        for &id in order.iter().rev() {
            let node = self.graph.get_node(id)?;
            let requested = regions.get(&id).copied().unwrap_or_default();
            let inputs = node.connected_inputs()?;
            if inputs.is_empty() {
                continue;
            }
            let name = node.display_name();
            for (input, region) in self.request_inputs(&name, &inputs, &requested, &node.padding())? {
                let entry = regions.entry(input).or_insert_with(ImageRegion::empty);
                *entry = entry.union(&region);
            }
        }

        log::trace!("Propagated requests: {:?}", regions);
        Ok(RequestedRegions { regions, order })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ComputeError, TilestreamError};
    use crate::core::node::{FilterMetadata, ImageFilter, TileContext};
    use crate::core::raster::{ComponentType, Raster};
    use crate::core::source::ConstantSource;

    struct Window {
        radius: u64,
        arity: usize,
    }

    impl ImageFilter for Window {
        fn metadata(&self) -> FilterMetadata {
            let mut builder = FilterMetadata::builder("window", "Window");
            for slot in 0..self.arity {
                builder = builder.input(format!("input{slot}"));
            }
            builder.build()
        }

        fn padding(&self) -> ImageRadius {
            ImageRadius::uniform(self.radius)
        }

        fn output_information(
            &self,
            inputs: &[crate::core::raster::ImageInfo],
        ) -> TilestreamResult<crate::core::raster::ImageInfo> {
            Ok(inputs[0])
        }

        fn threaded_generate(
            &self,
            _inputs: &[&Raster],
            _output: &mut Raster,
            _context: &TileContext,
        ) -> Result<(), ComputeError> {
            Ok(())
        }
    }

    #[test]
    fn test_compute_input_region_is_idempotent() {
        let largest = ImageRegion::from_size([100, 100]);
        let output = ImageRegion::rect(0, 40, 100, 20);
        let radius = ImageRadius::uniform(2);
        let once = compute_input_region(&output, &radius, &largest);
        let twice = compute_input_region(&output, &radius, &largest);
        assert_eq!(once, twice);
        assert_eq!(once, ImageRegion::rect(0, 38, 100, 24));
        assert_eq!(once, output.pad(&radius).intersection(&largest));
    }

    #[test]
    fn test_padding_accumulates_along_a_chain_only() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_source(ConstantSource::new(100, 100, ComponentType::U8, 0.0));
        let f = graph.add_filter(Window { radius: 1, arity: 1 });
        let g = graph.add_filter(Window { radius: 2, arity: 1 });
        graph.connect(src, f, 0).unwrap();
        graph.connect(f, g, 0).unwrap();
        graph.update_output_information(g).unwrap();

        let propagator = RequestedRegionPropagator::new(&graph);
        let request = ImageRegion::rect(10, 10, 10, 10);
        let regions = propagator.propagate(&[(g, request)]).unwrap();
        assert_eq!(regions.get(g), Some(&request));
        assert_eq!(regions.get(f), Some(&ImageRegion::rect(8, 8, 14, 14)));
        assert_eq!(regions.get(src), Some(&ImageRegion::rect(7, 7, 16, 16)));
        assert_eq!(regions.order(), &[src, f, g]);

        assert_eq!(propagator.propagate(&[(g, request)]).unwrap(), regions);
    }

    #[test]
    fn test_border_requests_are_cropped() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_source(ConstantSource::new(50, 50, ComponentType::U8, 0.0));
        let f = graph.add_filter(Window { radius: 3, arity: 1 });
        graph.connect(src, f, 0).unwrap();
        graph.update_output_information(f).unwrap();

        let regions = RequestedRegionPropagator::new(&graph)
            .propagate(&[(f, ImageRegion::rect(0, 0, 50, 10))])
            .unwrap();
        assert_eq!(regions.get(src), Some(&ImageRegion::rect(0, 0, 50, 13)));
    }

    #[test]
    fn test_shared_input_gets_union() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_source(ConstantSource::new(100, 100, ComponentType::U8, 0.0));
        let f = graph.add_filter(Window { radius: 1, arity: 1 });
        let g = graph.add_filter(Window { radius: 4, arity: 1 });
        graph.connect(src, f, 0).unwrap();
        graph.connect(src, g, 0).unwrap();
        graph.update_output_information(f).unwrap();
        graph.update_output_information(g).unwrap();

        let request = ImageRegion::rect(20, 20, 10, 10);
        let regions = RequestedRegionPropagator::new(&graph)
            .propagate(&[(f, request), (g, request)])
            .unwrap();
        assert_eq!(regions.get(src), Some(&ImageRegion::rect(16, 16, 18, 18)));
    }

    #[test]
    fn test_incongruent_inputs() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_source(ConstantSource::new(100, 100, ComponentType::U8, 0.0));
        let b = graph.add_source(ConstantSource::new(80, 100, ComponentType::U8, 0.0));
        let f = graph.add_filter(Window { radius: 0, arity: 2 });
        graph.connect_all(&[a, b], f).unwrap();
        graph.update_output_information(f).unwrap();

        let error = RequestedRegionPropagator::new(&graph)
            .propagate(&[(f, ImageRegion::from_size([100, 100]))])
            .unwrap_err();
        assert!(matches!(
            error,
            TilestreamError::Region(RegionError::Incongruent { .. })
        ));
    }

    #[test]
    fn test_empty_request_stays_empty() {
        let mut graph = PipelineGraph::new();
        let src = graph.add_source(ConstantSource::new(10, 10, ComponentType::U8, 0.0));
        let f = graph.add_filter(Window { radius: 2, arity: 1 });
        graph.connect(src, f, 0).unwrap();
        graph.update_output_information(f).unwrap();

        let regions = RequestedRegionPropagator::new(&graph)
            .propagate(&[(f, ImageRegion::rect(0, 5, 10, 0))])
            .unwrap();
        assert!(regions.get(src).unwrap().is_empty());
    }
}

//! Topological analysis of pipeline graphs.
//!
//! Provides algorithms for:
//! - Upstream closure of a set of nodes (what a terminal actually needs)
//! - Topological sorting (evaluation order, sources first)

use crate::core::error::{GraphError, GraphResult, NodeId};
use crate::graph::structure::PipelineGraph;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a PipelineGraph,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a PipelineGraph) -> Self {
        Self { graph }
    }

    /// Every node reachable upstream from `roots`, roots included.
    pub fn upstream_closure(&self, roots: &[NodeId]) -> GraphResult<BTreeSet<NodeId>> {
        let mut closure = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            let node = self.graph.get_node(current)?;
            if closure.insert(current) {
                queue.extend(node.inputs().iter().flatten().copied());
            }
        }
        Ok(closure)
    }

    /// Topological order of the upstream closure of `roots` (Kahn's algorithm).
    ///
    /// Dependencies come before dependents; ties are broken by ascending
    /// node index so the order is reproducible.
    pub fn upstream_order(&self, roots: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        let closure = self.upstream_closure(roots)?;
        self.sort(&closure)
    }

    /// Topological order of the whole graph.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let all: BTreeSet<NodeId> = self.graph.node_ids().collect();
        self.sort(&all)
    }

    fn sort(&self, nodes: &BTreeSet<NodeId>) -> GraphResult<Vec<NodeId>> {
        let mut in_degree: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut adjacency: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

        for &id in nodes {
            in_degree.entry(id).or_insert(0);
            adjacency.entry(id).or_default();
        }

        // One edge per connected slot; a node feeding two slots counts twice.
        for &id in nodes {
            for &upstream in self.graph.get_node(id)?.inputs().iter().flatten() {
                if nodes.contains(&upstream) {
                    adjacency.entry(upstream).or_default().push(id);
                    *in_degree.entry(id).or_insert(0) += 1;
                }
            }
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut result = Vec::with_capacity(nodes.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for neighbor in adjacency.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }

        if result.len() != nodes.len() {
            let remaining: Vec<NodeId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(&id, _)| id)
                .collect();
            return Err(GraphError::CycleDetected { nodes: remaining });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ComputeError;
    use crate::core::node::{FilterMetadata, ImageFilter, TileContext};
    use crate::core::raster::{ComponentType, Raster};
    use crate::core::source::ConstantSource;

    struct Join(usize);

    impl ImageFilter for Join {
        fn metadata(&self) -> FilterMetadata {
            let mut builder = FilterMetadata::builder("join", "Join");
            for slot in 0..self.0 {
                builder = builder.input(format!("input{slot}"));
            }
            builder.build()
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

    fn source() -> ConstantSource {
        ConstantSource::new(4, 4, ComponentType::U8, 0.0)
    }

    #[test]
    fn test_upstream_order_diamond() {
        // a -> b, a -> c, (b, c) -> d, plus an unrelated source e
        let mut graph = PipelineGraph::new();
        let a = graph.add_source(source());
        let b = graph.add_filter(Join(1));
        let c = graph.add_filter(Join(1));
        let d = graph.add_filter(Join(2));
        let e = graph.add_source(source());
        graph.connect(a, b, 0).unwrap();
        graph.connect(a, c, 0).unwrap();
        graph.connect_all(&[b, c], d).unwrap();

        let order = TopologyAnalyzer::new(&graph).upstream_order(&[d]).unwrap();
        assert_eq!(order, vec![a, b, c, d]);
        assert!(!order.contains(&e));

        let all = TopologyAnalyzer::new(&graph).topological_sort().unwrap();
        assert_eq!(all.len(), 5);
        let pos = |n| all.iter().position(|&x| x == n).unwrap();
        assert!(pos(a) < pos(b) && pos(b) < pos(d) && pos(c) < pos(d));
    }

    #[test]
    fn test_same_node_on_two_slots() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_source(source());
        let d = graph.add_filter(Join(2));
        graph.connect_all(&[a, a], d).unwrap();
        assert_eq!(graph.upstream_order(d).unwrap(), vec![a, d]);
    }

    #[test]
    fn test_unknown_root() {
        let graph = PipelineGraph::new();
        assert_eq!(
            TopologyAnalyzer::new(&graph).upstream_order(&[NodeId(3)]),
            Err(GraphError::NodeNotFound(NodeId(3)))
        );
    }
}

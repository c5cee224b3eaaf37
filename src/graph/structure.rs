//! Arena storage for pipeline nodes.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`] index. Every
//! filter input slot holds the index of its upstream node; every node keeps
//! the indices of its consumers as a back-reference that carries no
//! ownership. Nothing is reference counted, so the graph can never leak
//! through a cycle.

use crate::core::error::{GraphError, GraphResult, NodeId, TilestreamResult};
use crate::core::neighborhood::EdgePolicy;
use crate::core::node::ImageFilter;
use crate::core::raster::ImageInfo;
use crate::core::region::ImageRadius;
use crate::core::source::ImageSource;
use crate::graph::topology::TopologyAnalyzer;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// What a node does.
pub enum NodeKind {
    /// Reads pixels; has no inputs.
    Source(Box<dyn ImageSource>),
    /// Transforms its inputs tile by tile.
    Filter(Box<dyn ImageFilter>),
}

/// A node instance in the graph.
pub struct PipelineNode {
    id: NodeId,
    kind: NodeKind,
    inputs: Vec<Option<NodeId>>,
    consumers: Vec<NodeId>,
    label: Option<String>,
    information: Option<ImageInfo>,
}

impl fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineNode")
            .field("id", &self.id)
            .field("name", &self.display_name())
            .field("inputs", &self.inputs)
            .field("consumers", &self.consumers)
            .field("information", &self.information)
            .finish()
    }
}

impl PipelineNode {
    fn new(id: NodeId, kind: NodeKind) -> Self {
        let arity = match &kind {
            NodeKind::Source(_) => 0,
            NodeKind::Filter(filter) => filter.input_count(),
        };
        Self {
            id,
            kind,
            inputs: vec![None; arity],
            consumers: Vec::new(),
            label: None,
            information: None,
        }
    }

    /// Arena index.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Source or filter.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this node is a source.
    pub fn is_source(&self) -> bool {
        matches!(self.kind, NodeKind::Source(_))
    }

    /// Upstream node per input slot.
    pub fn inputs(&self) -> &[Option<NodeId>] {
        &self.inputs
    }

    /// Upstream nodes, failing on the first unconnected slot.
    pub fn connected_inputs(&self) -> GraphResult<Vec<NodeId>> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(slot, input)| {
                input.ok_or(GraphError::MissingInput {
                    node_id: self.id,
                    slot,
                })
            })
            .collect()
    }

    /// Nodes reading this node's output.
    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    /// Display name (label, or the filter/source name).
    pub fn display_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.kind {
            NodeKind::Source(source) => source.name().to_string(),
            NodeKind::Filter(filter) => filter.metadata().id,
        }
    }

    /// Neighborhood radius this node reads around each output pixel.
    pub fn padding(&self) -> ImageRadius {
        match &self.kind {
            NodeKind::Source(_) => ImageRadius::zero(),
            NodeKind::Filter(filter) => filter.padding(),
        }
    }

    /// Border policy of a filter node.
    pub fn edge_policy(&self) -> Option<EdgePolicy> {
        match &self.kind {
            NodeKind::Source(_) => None,
            NodeKind::Filter(filter) => Some(filter.edge_policy()),
        }
    }

    /// Cached output information, if generated since the last change.
    pub fn information(&self) -> Option<ImageInfo> {
        self.information
    }
}

/// The pipeline graph.
#[derive(Debug, Default)]
pub struct PipelineGraph {
    nodes: Vec<PipelineNode>,
}

impl PipelineGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PipelineNode::new(id, kind));
        id
    }

    /// Add a source node.
    pub fn add_source(&mut self, source: impl ImageSource + 'static) -> NodeId {
        self.push(NodeKind::Source(Box::new(source)))
    }

    /// Add a filter node.
    pub fn add_filter(&mut self, filter: impl ImageFilter + 'static) -> NodeId {
        self.add_boxed_filter(Box::new(filter))
    }

    /// Add a filter built elsewhere (e.g., by the registry).
    pub fn add_boxed_filter(&mut self, filter: Box<dyn ImageFilter>) -> NodeId {
        self.push(NodeKind::Filter(filter))
    }

    /// Set a display label.
    pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) -> GraphResult<()> {
        self.get_node_mut(id)?.label = Some(label.into());
        Ok(())
    }

    /// Get a reference to a node.
    pub fn get_node(&self, id: NodeId) -> GraphResult<&PipelineNode> {
        self.nodes.get(id.index()).ok_or(GraphError::NodeNotFound(id))
    }

    fn get_node_mut(&mut self, id: NodeId) -> GraphResult<&mut PipelineNode> {
        self.nodes.get_mut(id.index()).ok_or(GraphError::NodeNotFound(id))
    }

    /// Check if a node exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Get all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.iter()
    }

    /// Get all node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Mutable access to a filter's parameters.
    ///
    /// Cached output information of the node and of everything downstream is
    /// discarded, since any parameter may change the geometry.
    pub fn filter_mut(&mut self, id: NodeId) -> GraphResult<&mut dyn ImageFilter> {
        if self.get_node(id)?.is_source() {
            return Err(GraphError::SourceHasNoInputs(id));
        }
        self.invalidate(id);
        match &mut self.get_node_mut(id)?.kind {
            NodeKind::Filter(filter) => Ok(filter.as_mut()),
            NodeKind::Source(_) => Err(GraphError::SourceHasNoInputs(id)),
        }
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Connect `upstream`'s output to input `slot` of `downstream`.
    pub fn connect(&mut self, upstream: NodeId, downstream: NodeId, slot: usize) -> GraphResult<()> {
        self.get_node(upstream)?;
        let target = self.get_node(downstream)?;
        if target.is_source() {
            return Err(GraphError::SourceHasNoInputs(downstream));
        }
        let arity = target.inputs.len();
        if slot >= arity {
            return Err(GraphError::SlotOutOfRange {
                node_id: downstream,
                slot,
                arity,
            });
        }
        if target.inputs[slot].is_some() {
            return Err(GraphError::SlotAlreadyConnected {
                node_id: downstream,
                slot,
            });
        }
        if self.is_reachable(downstream, upstream) {
            return Err(GraphError::CycleDetected {
                nodes: vec![upstream, downstream],
            });
        }

        self.get_node_mut(downstream)?.inputs[slot] = Some(upstream);
        let consumers = &mut self.get_node_mut(upstream)?.consumers;
        if !consumers.contains(&downstream) {
            consumers.push(downstream);
        }
        self.invalidate(downstream);
        log::trace!("Connected {} -> {}[{}]", upstream, downstream, slot);
        Ok(())
    }

    /// Connect `upstream` to every slot of `downstream` in order.
    pub fn connect_all(&mut self, upstreams: &[NodeId], downstream: NodeId) -> GraphResult<()> {
        for (slot, &upstream) in upstreams.iter().enumerate() {
            self.connect(upstream, downstream, slot)?;
        }
        Ok(())
    }

    // ========================================================================
    // Graph Analysis
    // ========================================================================

    /// Check if `target` is reachable from `start` following consumer edges.
    pub fn is_reachable(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                if let Some(node) = self.nodes.get(current.index()) {
                    queue.extend(node.consumers.iter().copied());
                }
            }
        }

        false
    }

    /// Get all nodes that depend on the given node (downstream).
    pub fn get_downstream(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = match self.nodes.get(id.index()) {
            Some(node) => node.consumers.iter().copied().collect(),
            None => return result,
        };

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                if let Some(node) = self.nodes.get(current.index()) {
                    queue.extend(node.consumers.iter().copied());
                }
            }
        }

        result
    }

    /// Topological order of `id` and everything upstream of it.
    pub fn upstream_order(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        TopologyAnalyzer::new(self).upstream_order(&[id])
    }

    // ========================================================================
    // Output Information
    // ========================================================================

    fn invalidate(&mut self, id: NodeId) {
        let mut stale = self.get_downstream(id);
        stale.push(id);
        for node in stale {
            if let Some(node) = self.nodes.get_mut(node.index()) {
                node.information = None;
            }
        }
    }

    /// Cached output information, or an error if it was never generated.
    pub fn information(&self, id: NodeId) -> GraphResult<ImageInfo> {
        self.get_node(id)?
            .information
            .ok_or(GraphError::OutputInformationMissing(id))
    }

    /// Output information of every input of `id`, in slot order.
    pub fn input_information(&self, id: NodeId) -> TilestreamResult<Vec<ImageInfo>> {
        let inputs = self.get_node(id)?.connected_inputs()?;
        let mut infos = Vec::with_capacity(inputs.len());
        for input in inputs {
            infos.push(self.information(input)?);
        }
        Ok(infos)
    }

    /// Compute the output information of `id` from its inputs' cached
    /// information. Touches no pixels.
    pub fn generate_output_information(&mut self, id: NodeId) -> TilestreamResult<ImageInfo> {
        let information = match &self.get_node(id)?.kind {
            NodeKind::Source(source) => source.info(),
            NodeKind::Filter(filter) => {
                let inputs = self.input_information(id)?;
                filter.output_information(&inputs)?
            }
        };
        self.get_node_mut(id)?.information = Some(information);
        Ok(information)
    }

    /// Bring the output information of `id` and everything upstream of it up
    /// to date, reusing what is already cached.
    pub fn update_output_information(&mut self, id: NodeId) -> TilestreamResult<ImageInfo> {
        for node in self.upstream_order(id)? {
            if self.get_node(node)?.information.is_none() {
                let information = self.generate_output_information(node)?;
                log::trace!("Output information of {}: {:?}", node, information);
            }
        }
        Ok(self.information(id)?)
    }
}

//! Individual validation stages.
//!
//! Each stage checks for a specific category of errors.

use crate::core::error::{ConfigurationError, GraphError, NodeId, TilestreamResult};
use crate::core::raster::ImageInfo;
use crate::execution::terminal::Terminal;
use crate::graph::structure::{NodeKind, PipelineGraph};
use crate::graph::topology::TopologyAnalyzer;
use serde::Serialize;
use std::collections::BTreeMap;

/// A non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
    /// Node that triggered the warning, if applicable.
    pub node_id: Option<NodeId>,
    /// Suggested fix.
    pub suggestion: Option<String>,
}

/// Trait for validation stages.
pub trait ValidationStage: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Validate the part of `graph` read by `terminal`.
    ///
    /// Returns Ok with warnings, or the first error found.
    fn validate(
        &self,
        graph: &PipelineGraph,
        terminal: &dyn Terminal,
    ) -> TilestreamResult<Vec<ValidationWarning>>;
}

/// Structural validation - checks graph wiring.
///
/// Verifies:
/// - The terminal reads at least one node, and every node it reads exists
/// - Every input slot upstream of the terminal is connected
pub struct StructuralValidation;

impl ValidationStage for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(
        &self,
        graph: &PipelineGraph,
        terminal: &dyn Terminal,
    ) -> TilestreamResult<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();

        if terminal.inputs().is_empty() {
            return Err(ConfigurationError::InputCount {
                filter: terminal.name().to_string(),
                expected: 1,
                got: 0,
            }
            .into());
        }

        let closure = TopologyAnalyzer::new(graph).upstream_closure(terminal.inputs())?;
        for &id in &closure {
            graph.get_node(id)?.connected_inputs()?;
        }

        // Nodes the terminal never reads are harmless, but usually a wiring slip.
        for node in graph.nodes() {
            if !closure.contains(&node.id()) {
                warnings.push(ValidationWarning {
                    message: format!(
                        "Node '{}' is not read by '{}'",
                        node.display_name(),
                        terminal.name()
                    ),
                    node_id: Some(node.id()),
                    suggestion: Some("Connect it or remove it from the graph".to_string()),
                });
            }
        }

        Ok(warnings)
    }
}

/// Configuration validation - checks parameters against input geometry.
///
/// Output information is derived on the fly, without touching the graph's
/// cache, so the check has no side effects.
pub struct ConfigurationValidation;

impl ValidationStage for ConfigurationValidation {
    fn name(&self) -> &str {
        "Configuration Validation"
    }

    fn validate(
        &self,
        graph: &PipelineGraph,
        terminal: &dyn Terminal,
    ) -> TilestreamResult<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();
        let mut infos: BTreeMap<NodeId, ImageInfo> = BTreeMap::new();

        for id in TopologyAnalyzer::new(graph).upstream_order(terminal.inputs())? {
            let node = graph.get_node(id)?;
            let info = match node.kind() {
                NodeKind::Source(source) => source.info(),
                NodeKind::Filter(filter) => {
                    let inputs = collect(&infos, &node.connected_inputs()?)?;
                    filter.validate(&inputs)?;
                    let info = filter.output_information(&inputs)?;
                    let [rx, ry] = filter.padding().0;
                    if rx >= info.largest.width() || ry >= info.largest.height() {
                        warnings.push(ValidationWarning {
                            message: format!(
                                "Window of '{}' is larger than its {} input",
                                node.display_name(),
                                info.largest
                            ),
                            node_id: Some(id),
                            suggestion: Some(format!(
                                "Every pixel is a border pixel; edge policy '{}' applies everywhere",
                                filter.edge_policy()
                            )),
                        });
                    }
                    info
                }
            };
            if info.largest.is_empty() {
                warnings.push(ValidationWarning {
                    message: format!("Node '{}' produces an empty image", node.display_name()),
                    node_id: Some(id),
                    suggestion: None,
                });
            }
            infos.insert(id, info);
        }

        let inputs = collect(&infos, terminal.inputs())?;
        terminal.validate(&inputs)?;
        Ok(warnings)
    }
}

fn collect(infos: &BTreeMap<NodeId, ImageInfo>, ids: &[NodeId]) -> TilestreamResult<Vec<ImageInfo>> {
    ids.iter()
        .map(|id| {
            infos
                .get(id)
                .copied()
                .ok_or_else(|| GraphError::OutputInformationMissing(*id).into())
        })
        .collect()
}

// Unified four-layer DAG model
//
// Per-layer node/edge collections, cross-layer mapping tables, and the
// mutable state/metadata bags the iteration engine reads and stamps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to a DAG model mutated by concurrent optimizer passes.
pub type SharedDag = Arc<RwLock<UnifiedDagModel>>;

/// The four fixed layers, ordered by conceptual dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Function,
    Logic,
    Code,
    Order,
}

impl LayerType {
    pub const ALL: [LayerType; 4] = [
        LayerType::Function,
        LayerType::Logic,
        LayerType::Code,
        LayerType::Order,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Function => "function",
            LayerType::Logic => "logic",
            LayerType::Code => "code",
            LayerType::Order => "order",
        }
    }

    /// Lenient parse — unknown names yield `None`, never an error, so a
    /// malformed external payload cannot abort a running build.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "function" => Some(LayerType::Function),
            "logic" => Some(LayerType::Logic),
            "code" => Some(LayerType::Code),
            "order" => Some(LayerType::Order),
            _ => None,
        }
    }

    /// The immediate downstream layer, if any. Cross-layer mappings only
    /// ever point one step down.
    pub fn downstream(&self) -> Option<LayerType> {
        match self {
            LayerType::Function => Some(LayerType::Logic),
            LayerType::Logic => Some(LayerType::Code),
            LayerType::Code => Some(LayerType::Order),
            LayerType::Order => None,
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build stage stamped into the model's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DagStage {
    Planning,
    Iterating,
    Implementation,
    Completed,
}

impl DagStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DagStage::Planning => "planning",
            DagStage::Iterating => "iterating",
            DagStage::Implementation => "implementation",
            DagStage::Completed => "completed",
        }
    }
}

/// Positional hint for visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in a single layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    pub label: String,
    pub layer: LayerType,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// A directed edge between two nodes of the same layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Node and edge collections for one layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerData {
    #[serde(default)]
    pub nodes: HashMap<String, NodeData>,
    #[serde(default)]
    pub edges: HashMap<String, EdgeData>,
}

/// The whole four-layer structure.
///
/// Cross-layer mappings are keyed by the upstream layer; each entry maps an
/// upstream node id to the downstream node ids it realizes. The `state` and
/// `metadata` bags are free-form JSON, written by the iteration engine for
/// status stamping and read by the convergence evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedDagModel {
    #[serde(default)]
    layers: HashMap<LayerType, LayerData>,
    #[serde(default)]
    mappings: HashMap<LayerType, HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub state: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl UnifiedDagModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, layer: LayerType) -> Option<&LayerData> {
        self.layers.get(&layer)
    }

    pub fn node_count(&self, layer: LayerType) -> usize {
        self.layers.get(&layer).map_or(0, |l| l.nodes.len())
    }

    pub fn edge_count(&self, layer: LayerType) -> usize {
        self.layers.get(&layer).map_or(0, |l| l.edges.len())
    }

    pub fn total_nodes(&self) -> usize {
        LayerType::ALL.iter().map(|l| self.node_count(*l)).sum()
    }

    pub fn total_edges(&self) -> usize {
        LayerType::ALL.iter().map(|l| self.edge_count(*l)).sum()
    }

    pub fn node_ids(&self, layer: LayerType) -> impl Iterator<Item = &str> {
        self.layers
            .get(&layer)
            .into_iter()
            .flat_map(|l| l.nodes.keys())
            .map(String::as_str)
    }

    /// Up to `limit` node ids, sorted for stable output.
    pub fn sample_node_ids(&self, layer: LayerType, limit: usize) -> Vec<String> {
        let mut ids: Vec<String> = self.node_ids(layer).map(str::to_string).collect();
        ids.sort();
        ids.truncate(limit);
        ids
    }

    pub fn add_node(&mut self, layer: LayerType, node: NodeData) {
        self.layers
            .entry(layer)
            .or_default()
            .nodes
            .insert(node.id.clone(), node);
    }

    pub fn add_edge(&mut self, layer: LayerType, edge: EdgeData) {
        self.layers
            .entry(layer)
            .or_default()
            .edges
            .insert(edge.id.clone(), edge);
    }

    /// Record that `from_id` in `from` is realized by `to_id` one layer down.
    pub fn add_mapping(&mut self, from: LayerType, from_id: &str, to_id: &str) {
        self.mappings
            .entry(from)
            .or_default()
            .entry(from_id.to_string())
            .or_default()
            .push(to_id.to_string());
    }

    /// Downstream node ids mapped from `from_id`. Empty unless `to` is the
    /// immediate downstream layer of `from`.
    pub fn cross_layer_mappings(&self, from: LayerType, to: LayerType, from_id: &str) -> &[String] {
        if from.downstream() != Some(to) {
            return &[];
        }
        self.mappings
            .get(&from)
            .and_then(|m| m.get(from_id))
            .map_or(&[], Vec::as_slice)
    }

    /// Export for node-graph frontends: flat node/edge arrays with positions.
    pub fn to_reactflow(&self) -> Value {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for layer in LayerType::ALL {
            if let Some(data) = self.layers.get(&layer) {
                let mut ids: Vec<&String> = data.nodes.keys().collect();
                ids.sort();
                for id in ids {
                    let node = &data.nodes[id];
                    nodes.push(serde_json::json!({
                        "id": node.id,
                        "data": { "label": node.label, "layer": layer.as_str() },
                        "position": { "x": node.position.x, "y": node.position.y },
                    }));
                }
                let mut edge_ids: Vec<&String> = data.edges.keys().collect();
                edge_ids.sort();
                for id in edge_ids {
                    let edge = &data.edges[id];
                    edges.push(serde_json::json!({
                        "id": edge.id,
                        "source": edge.source,
                        "target": edge.target,
                    }));
                }
            }
        }
        serde_json::json!({ "nodes": nodes, "edges": edges })
    }

    /// Export as a mermaid graph, one subgraph per non-empty layer.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for layer in LayerType::ALL {
            let Some(data) = self.layers.get(&layer) else {
                continue;
            };
            if data.nodes.is_empty() {
                continue;
            }
            out.push_str(&format!("    subgraph {}\n", layer.as_str()));
            let mut ids: Vec<&String> = data.nodes.keys().collect();
            ids.sort();
            for id in ids {
                let node = &data.nodes[id];
                out.push_str(&format!("        {}[\"{}\"]\n", node.id, node.label));
            }
            out.push_str("    end\n");
            let mut edge_ids: Vec<&String> = data.edges.keys().collect();
            edge_ids.sort();
            for id in edge_ids {
                let edge = &data.edges[id];
                out.push_str(&format!("    {} --> {}\n", edge.source, edge.target));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(layer: LayerType, id: &str) -> NodeData {
        NodeData {
            id: id.to_string(),
            label: format!("node {id}"),
            layer,
            position: Position::default(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_layer_parse_roundtrip() {
        for layer in LayerType::ALL {
            assert_eq!(LayerType::parse(layer.as_str()), Some(layer));
        }
        assert_eq!(LayerType::parse("render"), None);
        assert_eq!(LayerType::parse("FUNCTION"), None);
    }

    #[test]
    fn test_downstream_chain() {
        assert_eq!(LayerType::Function.downstream(), Some(LayerType::Logic));
        assert_eq!(LayerType::Logic.downstream(), Some(LayerType::Code));
        assert_eq!(LayerType::Code.downstream(), Some(LayerType::Order));
        assert_eq!(LayerType::Order.downstream(), None);
    }

    #[test]
    fn test_add_node_and_counts() {
        let mut model = UnifiedDagModel::new();
        model.add_node(LayerType::Function, node(LayerType::Function, "f1"));
        model.add_node(LayerType::Function, node(LayerType::Function, "f2"));
        model.add_node(LayerType::Code, node(LayerType::Code, "c1"));

        assert_eq!(model.node_count(LayerType::Function), 2);
        assert_eq!(model.node_count(LayerType::Logic), 0);
        assert_eq!(model.total_nodes(), 3);
        assert_eq!(model.total_edges(), 0);
    }

    #[test]
    fn test_add_node_same_id_replaces() {
        let mut model = UnifiedDagModel::new();
        model.add_node(LayerType::Logic, node(LayerType::Logic, "l1"));
        model.add_node(LayerType::Logic, node(LayerType::Logic, "l1"));
        assert_eq!(model.node_count(LayerType::Logic), 1);
    }

    #[test]
    fn test_cross_layer_mappings_downstream_only() {
        let mut model = UnifiedDagModel::new();
        model.add_mapping(LayerType::Function, "f1", "l1");
        model.add_mapping(LayerType::Function, "f1", "l2");

        let mapped = model.cross_layer_mappings(LayerType::Function, LayerType::Logic, "f1");
        assert_eq!(mapped, ["l1".to_string(), "l2".to_string()]);

        // Only the immediate downstream layer counts
        assert!(model
            .cross_layer_mappings(LayerType::Function, LayerType::Code, "f1")
            .is_empty());
        assert!(model
            .cross_layer_mappings(LayerType::Logic, LayerType::Code, "f1")
            .is_empty());
    }

    #[test]
    fn test_sample_node_ids_sorted_and_bounded() {
        let mut model = UnifiedDagModel::new();
        for id in ["b", "a", "d", "c", "f", "e", "g"] {
            model.add_node(LayerType::Order, node(LayerType::Order, id));
        }
        let sample = model.sample_node_ids(LayerType::Order, 5);
        assert_eq!(sample, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_reactflow_export_shape() {
        let mut model = UnifiedDagModel::new();
        model.add_node(LayerType::Function, node(LayerType::Function, "f1"));
        model.add_edge(
            LayerType::Function,
            EdgeData {
                id: "e1".to_string(),
                source: "f1".to_string(),
                target: "f1".to_string(),
                label: None,
                metadata: HashMap::new(),
            },
        );

        let export = model.to_reactflow();
        assert_eq!(export["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(export["edges"].as_array().unwrap().len(), 1);
        assert_eq!(export["nodes"][0]["data"]["layer"], "function");
    }

    #[test]
    fn test_mermaid_export_skips_empty_layers() {
        let mut model = UnifiedDagModel::new();
        model.add_node(LayerType::Logic, node(LayerType::Logic, "l1"));

        let mermaid = model.to_mermaid();
        assert!(mermaid.starts_with("graph TD"));
        assert!(mermaid.contains("subgraph logic"));
        assert!(!mermaid.contains("subgraph function"));
        assert!(mermaid.contains("l1[\"node l1\"]"));
    }

    #[test]
    fn test_model_serde_roundtrip() {
        let mut model = UnifiedDagModel::new();
        model.add_node(LayerType::Function, node(LayerType::Function, "f1"));
        model.add_mapping(LayerType::Function, "f1", "l1");
        model
            .state
            .insert("validation_status".to_string(), serde_json::json!("partial"));

        let json = serde_json::to_string(&model).unwrap();
        let back: UnifiedDagModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_count(LayerType::Function), 1);
        assert_eq!(
            back.cross_layer_mappings(LayerType::Function, LayerType::Logic, "f1"),
            ["l1".to_string()]
        );
        assert_eq!(back.state["validation_status"], serde_json::json!("partial"));
    }
}

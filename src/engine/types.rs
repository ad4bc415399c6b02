// Iteration engine types — phases, focus, config, metrics, strategy,
// feedback decisions, and callback payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::dag::LayerType;

/// Engine-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationPhase {
    Initializing,
    Iterating,
    WaitingFeedback,
    ProcessingFeedback,
    Finalizing,
    Completed,
    Error,
}

impl IterationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationPhase::Initializing => "initializing",
            IterationPhase::Iterating => "iterating",
            IterationPhase::WaitingFeedback => "waiting_feedback",
            IterationPhase::ProcessingFeedback => "processing_feedback",
            IterationPhase::Finalizing => "finalizing",
            IterationPhase::Completed => "completed",
            IterationPhase::Error => "error",
        }
    }
}

/// The optimization objective steering each round's optimizer passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationFocus {
    #[default]
    Structure,
    Dependencies,
    Completeness,
    Consistency,
    Quality,
}

impl OptimizationFocus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationFocus::Structure => "structure",
            OptimizationFocus::Dependencies => "dependencies",
            OptimizationFocus::Completeness => "completeness",
            OptimizationFocus::Consistency => "consistency",
            OptimizationFocus::Quality => "quality",
        }
    }

    /// Lenient parse — unknown names yield `None`, never an error.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "structure" => Some(OptimizationFocus::Structure),
            "dependencies" => Some(OptimizationFocus::Dependencies),
            "completeness" => Some(OptimizationFocus::Completeness),
            "consistency" => Some(OptimizationFocus::Consistency),
            "quality" => Some(OptimizationFocus::Quality),
            _ => None,
        }
    }
}

/// Knobs for one build run.
#[derive(Debug, Clone)]
pub struct IterationConfig {
    pub max_iterations: u32,
    pub convergence_threshold: f64,
    /// Request external feedback every N iterations.
    pub feedback_frequency: u32,
    pub parallel_optimization: bool,
    /// Reserved — accepted and stored, not yet consulted by the loop.
    pub quality_gates_enabled: bool,
    /// Reserved — accepted and stored, not yet consulted by the loop.
    pub auto_adjust_strategy: bool,
    /// Deadline for one round's optimizer passes. Expiry cancels the round
    /// and records a validation error; the run keeps going.
    pub timeout_per_iteration: Duration,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            convergence_threshold: 0.85,
            feedback_frequency: 3,
            parallel_optimization: true,
            quality_gates_enabled: true,
            auto_adjust_strategy: true,
            timeout_per_iteration: Duration::from_secs(30),
        }
    }
}

/// Snapshot of one completed iteration. Appended to history, never mutated
/// after recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub iteration_number: u32,
    pub convergence_score: f64,
    pub quality_score: f64,
    pub completion_percentage: f64,
    #[serde(default)]
    pub layer_scores: HashMap<LayerType, f64>,
    /// Elapsed wall time for the round, in seconds.
    pub optimization_time: f64,
    pub total_nodes: usize,
    pub total_edges: usize,
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

/// Mutable weighting state steering the optimizer passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationStrategy {
    pub current_focus: OptimizationFocus,
    pub layer_priorities: HashMap<LayerType, f64>,
    #[serde(default)]
    pub optimization_params: HashMap<String, Value>,
}

impl Default for IterationStrategy {
    fn default() -> Self {
        Self {
            current_focus: OptimizationFocus::Structure,
            layer_priorities: HashMap::from([
                (LayerType::Function, 1.0),
                (LayerType::Logic, 0.8),
                (LayerType::Code, 0.6),
                (LayerType::Order, 0.4),
            ]),
            optimization_params: HashMap::new(),
        }
    }
}

impl IterationStrategy {
    pub const MIN_PRIORITY: f64 = 0.1;
    pub const MAX_PRIORITY: f64 = 2.0;

    /// Apply per-layer priority deltas. Unknown layer names are ignored so
    /// feedback from a looser external caller cannot crash the loop.
    pub fn adjust_priorities(&mut self, deltas: &HashMap<String, f64>) {
        for (name, delta) in deltas {
            let Some(layer) = LayerType::parse(name) else {
                continue;
            };
            let current = self.layer_priorities.get(&layer).copied().unwrap_or(1.0);
            let next = (current + delta).clamp(Self::MIN_PRIORITY, Self::MAX_PRIORITY);
            self.layer_priorities.insert(layer, next);
        }
    }

    pub fn set_priority(&mut self, layer: LayerType, priority: f64) {
        self.layer_priorities
            .insert(layer, priority.clamp(Self::MIN_PRIORITY, Self::MAX_PRIORITY));
    }
}

/// Seed values for the strategy, taken from the build request. Invalid
/// focus or layer names are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitialRequirements {
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub layer_priorities: HashMap<String, f64>,
}

/// What one optimizer pass did to its layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub layer: LayerType,
    pub action: String,
    pub nodes_processed: usize,
    pub edges_processed: usize,
    pub changes_made: usize,
    pub optimization_time: f64,
}

/// A decision returned from the feedback boundary.
///
/// Typed variants rather than a raw JSON bag, so an invalid decision is a
/// type error at the core and a lenient mapping at the wire (`from_value`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum FeedbackDecision {
    #[default]
    Continue,
    /// Throw the current strategy away and restart from defaults.
    Reject,
    Adjust {
        #[serde(default)]
        strategy: Option<StrategyPatch>,
        /// Per-layer priority deltas, keyed by layer name.
        #[serde(default)]
        layer_priorities: HashMap<String, f64>,
    },
}

impl FeedbackDecision {
    /// Map a wire-format payload to a decision. Accepts both a flat
    /// priority map and one nested under `layer_feedback`; anything
    /// unrecognized collapses to `Continue` so a malformed payload never
    /// aborts a run.
    pub fn from_value(value: &Value) -> Self {
        match value.get("decision").and_then(Value::as_str) {
            Some("reject") => FeedbackDecision::Reject,
            Some("adjust") => {
                let adjustments = value.get("adjustments").unwrap_or(&Value::Null);
                let strategy = adjustments
                    .get("strategy")
                    .and_then(|s| serde_json::from_value(s.clone()).ok());
                let layer_priorities = adjustments
                    .get("layer_priorities")
                    .map(|p| p.get("layer_feedback").unwrap_or(p))
                    .and_then(|p| serde_json::from_value::<HashMap<String, f64>>(p.clone()).ok())
                    .unwrap_or_default();
                FeedbackDecision::Adjust {
                    strategy,
                    layer_priorities,
                }
            }
            _ => FeedbackDecision::Continue,
        }
    }
}

/// Partial strategy update carried by an `Adjust` decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyPatch {
    /// New focus by name; unknown names are ignored when applied.
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub optimization_params: HashMap<String, Value>,
}

/// Per-layer summary included in a feedback request.
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub node_count: usize,
    pub edge_count: usize,
    /// Up to five sample node ids.
    pub key_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationExport {
    pub reactflow: Value,
    pub mermaid: String,
}

/// Everything a feedback collector needs to render the current build.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    pub iteration: u32,
    pub metrics: IterationMetrics,
    pub layers: HashMap<LayerType, LayerSummary>,
    pub current_focus: OptimizationFocus,
    pub layer_priorities: HashMap<LayerType, f64>,
    pub visualization: VisualizationExport,
}

/// Pushed to the progress handler after every iteration.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub iteration: u32,
    pub metrics: IterationMetrics,
    pub phase: IterationPhase,
}

/// Synchronous status snapshot of a running or finished build.
#[derive(Debug, Clone, Serialize)]
pub struct IteratorStatus {
    pub phase: IterationPhase,
    pub iteration: u32,
    pub strategy: IterationStrategy,
    pub history_count: usize,
    pub last_metrics: Option<IterationMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = IterationConfig::default();
        assert_eq!(config.max_iterations, 20);
        assert!((config.convergence_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.feedback_frequency, 3);
        assert!(config.parallel_optimization);
        assert_eq!(config.timeout_per_iteration, Duration::from_secs(30));
    }

    #[test]
    fn test_strategy_default_priorities() {
        let strategy = IterationStrategy::default();
        assert_eq!(strategy.current_focus, OptimizationFocus::Structure);
        assert_eq!(strategy.layer_priorities[&LayerType::Function], 1.0);
        assert_eq!(strategy.layer_priorities[&LayerType::Logic], 0.8);
        assert_eq!(strategy.layer_priorities[&LayerType::Code], 0.6);
        assert_eq!(strategy.layer_priorities[&LayerType::Order], 0.4);
    }

    #[test]
    fn test_adjust_priorities_clamps_both_ends() {
        let mut strategy = IterationStrategy::default();
        for _ in 0..10 {
            strategy.adjust_priorities(&HashMap::from([("function".to_string(), 10.0)]));
            strategy.adjust_priorities(&HashMap::from([("order".to_string(), -10.0)]));
        }
        assert_eq!(strategy.layer_priorities[&LayerType::Function], 2.0);
        assert_eq!(strategy.layer_priorities[&LayerType::Order], 0.1);
    }

    #[test]
    fn test_adjust_priorities_ignores_unknown_layers() {
        let mut strategy = IterationStrategy::default();
        let before = strategy.layer_priorities.clone();
        strategy.adjust_priorities(&HashMap::from([
            ("render".to_string(), 1.0),
            ("".to_string(), 1.0),
        ]));
        assert_eq!(strategy.layer_priorities, before);
    }

    #[test]
    fn test_focus_parse() {
        assert_eq!(
            OptimizationFocus::parse("dependencies"),
            Some(OptimizationFocus::Dependencies)
        );
        assert_eq!(OptimizationFocus::parse("speed"), None);
    }

    #[test]
    fn test_decision_from_value_reject() {
        let decision = FeedbackDecision::from_value(&json!({"decision": "reject"}));
        assert_eq!(decision, FeedbackDecision::Reject);
    }

    #[test]
    fn test_decision_from_value_unknown_is_continue() {
        assert_eq!(
            FeedbackDecision::from_value(&json!({"decision": "maybe"})),
            FeedbackDecision::Continue
        );
        assert_eq!(
            FeedbackDecision::from_value(&json!("garbage")),
            FeedbackDecision::Continue
        );
        assert_eq!(
            FeedbackDecision::from_value(&json!({})),
            FeedbackDecision::Continue
        );
    }

    #[test]
    fn test_decision_from_value_adjust_nested_priorities() {
        let decision = FeedbackDecision::from_value(&json!({
            "decision": "adjust",
            "adjustments": {
                "layer_priorities": { "layer_feedback": { "function": 0.5 } }
            }
        }));
        match decision {
            FeedbackDecision::Adjust {
                strategy,
                layer_priorities,
            } => {
                assert!(strategy.is_none());
                assert_eq!(layer_priorities["function"], 0.5);
            }
            other => panic!("expected adjust, got {other:?}"),
        }
    }

    #[test]
    fn test_decision_from_value_adjust_flat_priorities_and_strategy() {
        let decision = FeedbackDecision::from_value(&json!({
            "decision": "adjust",
            "adjustments": {
                "strategy": { "focus": "quality", "optimization_params": { "depth": 2 } },
                "layer_priorities": { "logic": -0.2 }
            }
        }));
        match decision {
            FeedbackDecision::Adjust {
                strategy,
                layer_priorities,
            } => {
                let patch = strategy.unwrap();
                assert_eq!(patch.focus.as_deref(), Some("quality"));
                assert_eq!(patch.optimization_params["depth"], json!(2));
                assert_eq!(layer_priorities["logic"], -0.2);
            }
            other => panic!("expected adjust, got {other:?}"),
        }
    }

    #[test]
    fn test_metrics_serde_roundtrip() {
        let metrics = IterationMetrics {
            iteration_number: 3,
            convergence_score: 0.42,
            layer_scores: HashMap::from([(LayerType::Function, 0.3)]),
            validation_errors: vec!["iteration timed out after 30s".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_string(&metrics).unwrap();
        let back: IterationMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.iteration_number, 3);
        assert_eq!(back.layer_scores[&LayerType::Function], 0.3);
        assert_eq!(back.validation_errors.len(), 1);
    }
}

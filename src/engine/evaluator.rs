// Convergence scoring for the four-layer structure
//
// Produces a single [0,1] score from four weighted sub-scores and keeps a
// bounded history of past iteration metrics for stability analysis.

use serde_json::Value;

use crate::dag::{LayerType, UnifiedDagModel};

use super::types::IterationMetrics;

/// Weights for structure, consistency, quality, stability — in that order.
const SUB_SCORE_WEIGHTS: [f64; 4] = [0.30, 0.30, 0.25, 0.15];

/// History ring bound. Oldest entries drop first.
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default)]
pub struct ConvergenceEvaluator {
    history: Vec<IterationMetrics>,
}

impl ConvergenceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite convergence estimate for the current structure, in [0,1].
    pub fn evaluate_convergence(&self, model: &UnifiedDagModel) -> f64 {
        let scores = [
            self.structure_completeness(model),
            self.layer_consistency(model),
            self.quality_metrics(model),
            self.stability(),
        ];
        let weighted: f64 = scores
            .iter()
            .zip(SUB_SCORE_WEIGHTS.iter())
            .map(|(score, weight)| score * weight)
            .sum();
        weighted.clamp(0.0, 1.0)
    }

    /// Averaged per-layer node-count and connectivity score. Layers with no
    /// nodes are excluded from the average, not penalized to zero.
    fn structure_completeness(&self, model: &UnifiedDagModel) -> f64 {
        let mut total = 0.0;
        let mut counted = 0usize;
        for layer in LayerType::ALL {
            let nodes = model.node_count(layer);
            if nodes == 0 {
                continue;
            }
            counted += 1;
            let edges = model.edge_count(layer);
            let node_score = (nodes as f64 / 5.0).min(1.0);
            let connectivity = if nodes > 1 {
                // 10% of the directed complete graph counts as fully connected
                let max_edges = (nodes * (nodes - 1)) as f64;
                (edges as f64 / max_edges.max(1.0) * 10.0).min(1.0)
            } else {
                0.0
            };
            total += (node_score + connectivity) / 2.0;
        }
        total / counted.max(1) as f64
    }

    /// Share of upstream nodes with at least one downstream mapping, over
    /// the function→logic and logic→code boundaries.
    fn layer_consistency(&self, model: &UnifiedDagModel) -> f64 {
        let mut mapped = 0usize;
        let mut checked = 0usize;
        for (from, to) in [
            (LayerType::Function, LayerType::Logic),
            (LayerType::Logic, LayerType::Code),
        ] {
            for node_id in model.node_ids(from) {
                if !model.cross_layer_mappings(from, to, node_id).is_empty() {
                    mapped += 1;
                }
                checked += 1;
            }
        }
        mapped as f64 / checked.max(1) as f64
    }

    /// Mean of the quality indicators present in the model's state bag.
    pub fn quality_metrics(&self, model: &UnifiedDagModel) -> f64 {
        let mut indicators = vec![match model
            .state
            .get("validation_status")
            .and_then(Value::as_str)
        {
            Some("passed") => 1.0,
            Some("partial") => 0.6,
            _ => 0.2,
        }];

        let total_nodes = model
            .state
            .get("total_nodes")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if total_nodes > 0 {
            indicators.push((total_nodes as f64 / 10.0).min(1.0));
        }

        indicators.iter().sum::<f64>() / indicators.len().max(1) as f64
    }

    /// Low variance across the last three convergence scores reads as
    /// stable. Below three recorded iterations the answer is a neutral 0.5
    /// rather than 0 or 1, to avoid biasing early rounds either way.
    fn stability(&self) -> f64 {
        if self.history.len() < 3 {
            return 0.5;
        }
        let recent: Vec<f64> = self.history[self.history.len() - 3..]
            .iter()
            .map(|m| m.convergence_score)
            .collect();
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let variance = recent
            .iter()
            .map(|score| (score - mean).powi(2))
            .sum::<f64>()
            / recent.len() as f64;
        (1.0 - variance * 10.0).max(0.0)
    }

    /// Append to history, dropping the oldest entries past the ring bound.
    pub fn add_metrics(&mut self, metrics: IterationMetrics) {
        self.history.push(metrics);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    pub fn history(&self) -> &[IterationMetrics] {
        &self.history
    }
}

// Four-layer iterative build orchestrator
//
// Drives optimization rounds across the four layers, scores convergence
// after each round, requests external feedback on a fixed cadence, and
// folds the decisions back into the strategy. Handler failures are logged
// and ignored; optimizer or evaluator failures end the run in the error
// phase and propagate to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use futures::future::{try_join_all, BoxFuture};
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::dag::{DagStage, LayerType, SharedDag, UnifiedDagModel};

use super::evaluator::ConvergenceEvaluator;
use super::optimizer::LayerOptimizer;
use super::types::{
    FeedbackDecision, FeedbackRequest, InitialRequirements, IterationConfig, IterationMetrics,
    IterationPhase, IterationStrategy, IteratorStatus, LayerSummary, OptimizationFocus,
    OptimizationResult, ProgressUpdate, StrategyPatch, VisualizationExport,
};

pub type FeedbackHandler =
    Arc<dyn Fn(FeedbackRequest) -> BoxFuture<'static, Result<FeedbackDecision>> + Send + Sync>;
pub type ProgressHandler =
    Arc<dyn Fn(ProgressUpdate) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct FourLayerIterator {
    config: IterationConfig,
    strategy: IterationStrategy,
    evaluator: ConvergenceEvaluator,
    optimizers: Vec<LayerOptimizer>,
    phase: IterationPhase,
    iteration: u32,
    history: Vec<IterationMetrics>,
    feedback_handler: Option<FeedbackHandler>,
    progress_handler: Option<ProgressHandler>,
}

impl FourLayerIterator {
    pub fn new(config: IterationConfig) -> Self {
        Self {
            config,
            strategy: IterationStrategy::default(),
            evaluator: ConvergenceEvaluator::new(),
            optimizers: LayerType::ALL.iter().copied().map(LayerOptimizer::new).collect(),
            phase: IterationPhase::Initializing,
            iteration: 0,
            history: Vec::new(),
            feedback_handler: None,
            progress_handler: None,
        }
    }

    /// Register the handler asked for a decision every `feedback_frequency`
    /// iterations. Without one, feedback rounds are skipped entirely.
    pub fn set_feedback_handler<F>(&mut self, handler: F)
    where
        F: Fn(FeedbackRequest) -> BoxFuture<'static, Result<FeedbackDecision>>
            + Send
            + Sync
            + 'static,
    {
        self.feedback_handler = Some(Arc::new(handler));
    }

    /// Register the observer notified after every iteration. Its return
    /// value and errors are both ignored.
    pub fn set_progress_handler<F>(&mut self, handler: F)
    where
        F: Fn(ProgressUpdate) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.progress_handler = Some(Arc::new(handler));
    }

    /// Current phase, iteration, strategy, and last recorded metrics.
    pub fn status(&self) -> IteratorStatus {
        IteratorStatus {
            phase: self.phase,
            iteration: self.iteration,
            strategy: self.strategy.clone(),
            history_count: self.history.len(),
            last_metrics: self.history.last().cloned(),
        }
    }

    /// Run the build loop to completion. The model is mutated in place;
    /// final status lands in its state bag. Any systemic failure leaves the
    /// iterator in the error phase and propagates.
    pub async fn iterate_build(
        &mut self,
        dag: &SharedDag,
        initial_requirements: Option<&InitialRequirements>,
    ) -> Result<()> {
        self.phase = IterationPhase::Initializing;
        self.iteration = 0;

        if let Some(requirements) = initial_requirements {
            self.seed_strategy(requirements);
        }

        match self.run_loop(dag).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.phase = IterationPhase::Error;
                Err(e)
            }
        }
    }

    async fn run_loop(&mut self, dag: &SharedDag) -> Result<()> {
        self.phase = IterationPhase::Iterating;
        let mut last_score = 0.0;

        while self.iteration < self.config.max_iterations
            && self.phase != IterationPhase::Completed
        {
            self.iteration += 1;
            let round_start = Instant::now();

            let mut metrics = self.run_round(dag).await?;
            metrics.iteration_number = self.iteration;
            metrics.optimization_time = round_start.elapsed().as_secs_f64();
            last_score = metrics.convergence_score;

            self.history.push(metrics.clone());
            self.evaluator.add_metrics(metrics.clone());

            self.report_progress(&metrics).await;

            if self.config.feedback_frequency > 0
                && self.iteration % self.config.feedback_frequency == 0
                && self.feedback_handler.is_some()
            {
                self.phase = IterationPhase::WaitingFeedback;
                let request = self.build_feedback_request(dag, &metrics).await;
                let decision = self.request_feedback(request).await;
                self.phase = IterationPhase::ProcessingFeedback;
                self.apply_decision(decision);
                self.phase = IterationPhase::Iterating;
            }

            if metrics.convergence_score >= self.config.convergence_threshold {
                info!(
                    iteration = self.iteration,
                    score = metrics.convergence_score,
                    "convergence threshold reached"
                );
                self.phase = IterationPhase::Finalizing;
                self.finalize(dag).await;
                self.phase = IterationPhase::Completed;
                break;
            }
        }

        // Final status stamping, whether the loop hit the threshold or ran
        // out of iterations.
        {
            let mut model = dag.write().await;
            model
                .metadata
                .insert("stage".to_string(), json!(DagStage::Implementation.as_str()));
            model
                .state
                .insert("current_iteration".to_string(), json!(self.iteration));
            model
                .state
                .insert("convergence_score".to_string(), json!(last_score));
            model
                .state
                .insert("validation_status".to_string(), json!("completed"));
        }
        self.phase = IterationPhase::Completed;
        Ok(())
    }

    /// One iteration round: run the four optimizer passes (under the
    /// per-iteration deadline), then recompute all metrics from the model.
    async fn run_round(&self, dag: &SharedDag) -> Result<IterationMetrics> {
        let mut validation_errors = Vec::new();

        let results = match timeout(self.config.timeout_per_iteration, self.run_optimizers(dag))
            .await
        {
            Ok(results) => results?,
            Err(_) => {
                // A late round is a recorded warning, not a fatal abort
                let seconds = self.config.timeout_per_iteration.as_secs();
                warn!(iteration = self.iteration, seconds, "optimization round timed out");
                validation_errors.push(format!("iteration timed out after {seconds}s"));
                Vec::new()
            }
        };
        debug!(
            iteration = self.iteration,
            passes = results.len(),
            "optimizer passes finished"
        );

        let model = dag.read().await;
        let convergence_score = self.evaluator.evaluate_convergence(&model);

        let mut layer_scores = HashMap::new();
        for layer in LayerType::ALL {
            layer_scores.insert(layer, layer_score(&model, layer));
        }

        Ok(IterationMetrics {
            iteration_number: 0, // stamped by the loop
            convergence_score,
            quality_score: self.evaluator.quality_metrics(&model),
            completion_percentage: (convergence_score * 100.0).min(100.0),
            layer_scores,
            optimization_time: 0.0, // stamped by the loop
            total_nodes: model.total_nodes(),
            total_edges: model.total_edges(),
            validation_errors,
        })
    }

    async fn run_optimizers(&self, dag: &SharedDag) -> Result<Vec<OptimizationResult>> {
        if self.config.parallel_optimization {
            let passes = self
                .optimizers
                .iter()
                .map(|optimizer| optimizer.optimize(dag, &self.strategy, self.iteration));
            try_join_all(passes).await
        } else {
            let mut results = Vec::with_capacity(self.optimizers.len());
            for optimizer in &self.optimizers {
                results.push(
                    optimizer
                        .optimize(dag, &self.strategy, self.iteration)
                        .await?,
                );
            }
            Ok(results)
        }
    }

    async fn build_feedback_request(
        &self,
        dag: &SharedDag,
        metrics: &IterationMetrics,
    ) -> FeedbackRequest {
        let model = dag.read().await;
        let mut layers = HashMap::new();
        for layer in LayerType::ALL {
            layers.insert(
                layer,
                LayerSummary {
                    node_count: model.node_count(layer),
                    edge_count: model.edge_count(layer),
                    key_nodes: model.sample_node_ids(layer, 5),
                },
            );
        }
        FeedbackRequest {
            iteration: self.iteration,
            metrics: metrics.clone(),
            layers,
            current_focus: self.strategy.current_focus,
            layer_priorities: self.strategy.layer_priorities.clone(),
            visualization: VisualizationExport {
                reactflow: model.to_reactflow(),
                mermaid: model.to_mermaid(),
            },
        }
    }

    async fn request_feedback(&self, request: FeedbackRequest) -> FeedbackDecision {
        let Some(handler) = &self.feedback_handler else {
            return FeedbackDecision::Continue;
        };
        match handler(request).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("feedback handler failed: {e:#}");
                FeedbackDecision::Continue
            }
        }
    }

    async fn report_progress(&self, metrics: &IterationMetrics) {
        let Some(handler) = &self.progress_handler else {
            return;
        };
        let update = ProgressUpdate {
            iteration: self.iteration,
            metrics: metrics.clone(),
            phase: self.phase,
        };
        if let Err(e) = handler(update).await {
            warn!("progress handler failed: {e:#}");
        }
    }

    fn apply_decision(&mut self, decision: FeedbackDecision) {
        match decision {
            FeedbackDecision::Continue => {}
            FeedbackDecision::Reject => {
                info!("feedback rejected the current direction; resetting strategy");
                self.strategy = IterationStrategy::default();
            }
            FeedbackDecision::Adjust {
                strategy,
                layer_priorities,
            } => {
                if let Some(patch) = strategy {
                    self.apply_strategy_patch(patch);
                }
                self.strategy.adjust_priorities(&layer_priorities);
            }
        }
    }

    fn apply_strategy_patch(&mut self, patch: StrategyPatch) {
        if let Some(name) = patch.focus.as_deref() {
            match OptimizationFocus::parse(name) {
                Some(focus) => self.strategy.current_focus = focus,
                None => debug!(focus = name, "ignoring unknown optimization focus"),
            }
        }
        self.strategy
            .optimization_params
            .extend(patch.optimization_params);
    }

    fn seed_strategy(&mut self, requirements: &InitialRequirements) {
        if let Some(focus) = requirements.focus.as_deref().and_then(OptimizationFocus::parse) {
            self.strategy.current_focus = focus;
        }
        for (name, priority) in &requirements.layer_priorities {
            if let Some(layer) = LayerType::parse(name) {
                self.strategy.set_priority(layer, *priority);
            }
        }
    }

    async fn finalize(&self, dag: &SharedDag) {
        let mut model = dag.write().await;
        model
            .state
            .insert("validation_status".to_string(), json!("passed"));
        model
            .state
            .insert("last_modified".to_string(), json!(Utc::now().to_rfc3339()));
    }
}

/// Per-layer readiness score used in the metrics report. Not the same edge
/// formula as the evaluator's structure sub-score: complete-graph-half
/// denominator and a 20% connectivity target. Keep the two separate.
pub fn layer_score(model: &UnifiedDagModel, layer: LayerType) -> f64 {
    let nodes = model.node_count(layer);
    if nodes == 0 {
        return 0.0;
    }
    let edges = model.edge_count(layer);
    let node_score = (nodes as f64 / 5.0).min(1.0);
    let edge_score = if nodes > 1 {
        let max_edges = (nodes * (nodes - 1)) as f64 / 2.0;
        (edges as f64 / max_edges.max(1.0) * 5.0).min(1.0)
    } else {
        0.0
    };
    (node_score + edge_score) / 2.0
}

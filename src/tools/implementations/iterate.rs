// DAG iteration tool
//
// Runs the four-layer convergence engine over a fresh model, logging
// progress per round. With collect_feedback enabled, feedback rounds open
// sessions in the shared store and wait for a human decision; otherwise
// feedback rounds are skipped and the engine runs unattended.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::dag::{DagStorage, SharedDag, UnifiedDagModel};
use crate::engine::{
    FeedbackDecision, FourLayerIterator, InitialRequirements, IterationConfig,
};
use crate::feedback::{FeedbackSubmission, SessionStore};
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolInputSchema, ToolOutput};

use super::build_layer::{ensure_workspace, DATA_DIR};
use super::resolve_project_path;

const DEFAULT_FEEDBACK_WAIT_SECS: u64 = 120;

pub struct IterateDagTool;

#[async_trait]
impl Tool for IterateDagTool {
    fn name(&self) -> &str {
        "iterate_dag"
    }

    fn description(&self) -> &str {
        "Run the four-layer iterative construction engine: optimize all layers each round, \
         score convergence, and stop at the threshold or the iteration cap. Set \
         collect_feedback to pause on the feedback cadence and wait for a human decision. \
         Saves the final model to the project and reports per-round metrics."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: json!({
                "project_path": {
                    "type": "string",
                    "description": "Project root directory; auto-detected when empty"
                },
                "max_iterations": {
                    "type": "integer",
                    "description": "Iteration cap (default 20)"
                },
                "convergence_threshold": {
                    "type": "number",
                    "description": "Stop once the convergence score reaches this value (default 0.85)"
                },
                "feedback_frequency": {
                    "type": "integer",
                    "description": "Request feedback every N iterations (default 3)"
                },
                "parallel": {
                    "type": "boolean",
                    "description": "Optimize the four layers concurrently (default true)"
                },
                "timeout_per_iteration": {
                    "type": "integer",
                    "description": "Per-round deadline in seconds (default 30)"
                },
                "focus": {
                    "type": "string",
                    "description": "Initial optimization focus: structure, dependencies, completeness, consistency, or quality"
                },
                "layer_priorities": {
                    "type": "object",
                    "description": "Initial per-layer priority weights, keyed by layer name"
                },
                "collect_feedback": {
                    "type": "boolean",
                    "description": "Open feedback sessions on the feedback cadence (default false)"
                },
                "feedback_timeout": {
                    "type": "integer",
                    "description": "Seconds to wait for each feedback session (default 120)"
                }
            }),
            required: Vec::new(),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let provided = input["project_path"].as_str().unwrap_or_default();
        let project_path = resolve_project_path(provided, &context.path_cache);

        let mut config = IterationConfig::default();
        if let Some(n) = input["max_iterations"].as_u64() {
            config.max_iterations = n as u32;
        }
        if let Some(threshold) = input["convergence_threshold"].as_f64() {
            config.convergence_threshold = threshold;
        }
        if let Some(n) = input["feedback_frequency"].as_u64() {
            config.feedback_frequency = n as u32;
        }
        if let Some(parallel) = input["parallel"].as_bool() {
            config.parallel_optimization = parallel;
        }
        if let Some(seconds) = input["timeout_per_iteration"].as_u64() {
            config.timeout_per_iteration = Duration::from_secs(seconds);
        }

        let requirements = InitialRequirements {
            focus: input["focus"].as_str().map(str::to_string),
            layer_priorities: serde_json::from_value(input["layer_priorities"].clone())
                .unwrap_or_default(),
        };

        let dag: SharedDag = Arc::new(RwLock::new(UnifiedDagModel::new()));
        let mut iterator = FourLayerIterator::new(config);

        iterator.set_progress_handler(|update| {
            Box::pin(async move {
                info!(
                    iteration = update.iteration,
                    score = update.metrics.convergence_score,
                    nodes = update.metrics.total_nodes,
                    "optimization round complete"
                );
                Ok(())
            })
        });

        if input["collect_feedback"].as_bool().unwrap_or(false) {
            let sessions = context.sessions.clone();
            let project = project_path.display().to_string();
            let wait = Duration::from_secs(
                input["feedback_timeout"]
                    .as_u64()
                    .unwrap_or(DEFAULT_FEEDBACK_WAIT_SECS),
            );
            iterator.set_feedback_handler(move |request| {
                let sessions = sessions.clone();
                let project = project.clone();
                Box::pin(async move {
                    let summary = format!(
                        "Iteration {}: convergence {:.2}, awaiting direction",
                        request.iteration, request.metrics.convergence_score
                    );
                    Ok(collect_decision(&sessions, &project, &summary, wait).await)
                })
            });
        }

        match iterator.iterate_build(&dag, Some(&requirements)).await {
            Ok(()) => {}
            Err(e) => return Ok(ToolOutput::error(format!("Iteration failed: {e:#}"))),
        }

        let status = iterator.status();
        let model = dag.read().await;

        // Persist the final model alongside the layer documents
        let data_dir = project_path.join(DATA_DIR);
        ensure_workspace(&project_path, &data_dir)?;
        let storage = DagStorage::new(&data_dir)?;
        let saved = storage.save_dag(
            json!({
                "layer_type": "unified",
                "layer_name": "Unified four-layer model",
                "model": &*model,
                "final_metrics": status.last_metrics,
            }),
            None,
        )?;
        debug!(file = %saved.filename, "final model saved");

        let result = json!({
            "success": true,
            "phase": status.phase,
            "iterations": status.iteration,
            "final_metrics": status.last_metrics,
            "strategy": status.strategy,
            "state": model.state,
            "mermaid": model.to_mermaid(),
            "storage_info": {
                "file_path": saved.path,
                "dag_id": saved.dag_id,
            },
        });

        Ok(ToolOutput::text(serde_json::to_string_pretty(&result)?))
    }
}

/// Open a feedback session, wait for a submission, and map it to a
/// decision. A timeout or an unparseable submission means continue.
async fn collect_decision(
    sessions: &SessionStore,
    project: &str,
    summary: &str,
    wait: Duration,
) -> FeedbackDecision {
    let (info, receiver) = sessions.open(project, summary);
    debug!(session = %info.id, "waiting for iteration feedback");
    match sessions.wait(&info.id, receiver, wait).await {
        Some(submission) => decision_from_submission(&submission),
        None => FeedbackDecision::Continue,
    }
}

fn decision_from_submission(submission: &FeedbackSubmission) -> FeedbackDecision {
    match serde_json::from_str::<Value>(&submission.interactive_feedback) {
        Ok(value) => FeedbackDecision::from_value(&value),
        Err(_) => FeedbackDecision::Continue,
    }
}

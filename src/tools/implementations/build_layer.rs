// Layer-build tools
//
// One tool per DAG layer, sharing a single implementation. Each accepts a
// mermaid description plus layer-specific context, initializes the project
// workspace on first use, and persists the layer document.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::dag::{DagStorage, LayerType};
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolInputSchema, ToolOutput};

use super::resolve_project_path;

/// Name of the per-project data directory.
pub const DATA_DIR: &str = ".stratum";

pub struct LayerBuildTool {
    layer: LayerType,
    name: String,
}

impl LayerBuildTool {
    pub fn new(layer: LayerType) -> Self {
        Self {
            name: format!("build_{}_layer", layer.as_str()),
            layer,
        }
    }

    fn layer_title(&self) -> &'static str {
        match self.layer {
            LayerType::Function => "Function layer (what)",
            LayerType::Logic => "Logic layer (how)",
            LayerType::Code => "Code layer (with what)",
            LayerType::Order => "Order layer (when)",
        }
    }

    fn layer_description(&self) -> &'static str {
        match self.layer {
            LayerType::Function => "Business goals and feature requirements",
            LayerType::Logic => "Technical architecture and system design",
            LayerType::Code => "Implementation modules and their organization",
            LayerType::Order => "Execution order and scheduling",
        }
    }

    /// The layer-specific free-text input alongside the mermaid DAG.
    fn context_field(&self) -> (&'static str, &'static str) {
        match self.layer {
            LayerType::Function => (
                "business_requirements",
                "Business requirements for the function layer",
            ),
            LayerType::Logic => (
                "technical_architecture",
                "Technical architecture notes for the logic layer",
            ),
            LayerType::Code => (
                "implementation_details",
                "Implementation details and technology choices",
            ),
            LayerType::Order => (
                "execution_strategy",
                "Execution ordering and scheduling strategy",
            ),
        }
    }

    /// Result of the upstream layer's build, absent for the function layer.
    fn upstream_field(&self) -> Option<(&'static str, &'static str)> {
        match self.layer {
            LayerType::Function => None,
            LayerType::Logic => Some(("function_layer_result", "Result of the function layer build")),
            LayerType::Code => Some(("logic_layer_result", "Result of the logic layer build")),
            LayerType::Order => Some(("code_layer_result", "Result of the code layer build")),
        }
    }

    fn focus_terms(&self) -> [&'static str; 2] {
        match self.layer {
            LayerType::Function => ["feature identification", "feature dependencies"],
            LayerType::Logic => ["architecture design", "technology selection"],
            LayerType::Code => ["code modules", "implementation detail"],
            LayerType::Order => ["execution order", "scheduling control"],
        }
    }
}

#[async_trait]
impl Tool for LayerBuildTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        match self.layer {
            LayerType::Function => {
                "Build the function-layer DAG from a mermaid description: business goals and \
                 feature requirements. Leave project_path empty to auto-detect the project root."
            }
            LayerType::Logic => {
                "Build the logic-layer DAG from a mermaid description: technical architecture \
                 and system design. Leave project_path empty to auto-detect the project root."
            }
            LayerType::Code => {
                "Build the code-layer DAG from a mermaid description: implementation modules \
                 and their organization. Leave project_path empty to auto-detect the project root."
            }
            LayerType::Order => {
                "Build the order-layer DAG from a mermaid description: execution order and \
                 scheduling. Leave project_path empty to auto-detect the project root."
            }
        }
    }

    fn input_schema(&self) -> ToolInputSchema {
        let mut properties = serde_json::Map::new();
        properties.insert(
            "project_path".to_string(),
            json!({
                "type": "string",
                "description": "Project root directory; auto-detected when empty"
            }),
        );
        properties.insert(
            "mermaid_dag".to_string(),
            json!({
                "type": "string",
                "description": "Mermaid description of this layer's DAG"
            }),
        );
        let (context_key, context_desc) = self.context_field();
        properties.insert(
            context_key.to_string(),
            json!({ "type": "string", "description": context_desc }),
        );
        if let Some((upstream_key, upstream_desc)) = self.upstream_field() {
            properties.insert(
                upstream_key.to_string(),
                json!({ "type": "string", "description": upstream_desc }),
            );
        } else {
            properties.insert(
                "project_description".to_string(),
                json!({ "type": "string", "description": "Project description and goals" }),
            );
        }

        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Value::Object(properties),
            required: Vec::new(),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let provided = input["project_path"].as_str().unwrap_or_default();
        let project_path = resolve_project_path(provided, &context.path_cache);
        debug!(project = %project_path.display(), layer = %self.layer, "building layer document");

        let data_dir = project_path.join(DATA_DIR);
        ensure_workspace(&project_path, &data_dir)?;
        let storage = DagStorage::new(&data_dir)?;

        let mermaid = input["mermaid_dag"].as_str().unwrap_or_default();
        let node_count = if mermaid.is_empty() {
            0
        } else {
            mermaid.lines().count()
        };

        let mut input_data = serde_json::Map::new();
        input_data.insert("mermaid_dag".to_string(), json!(mermaid));
        let (context_key, _) = self.context_field();
        input_data.insert(
            context_key.to_string(),
            json!(input[context_key].as_str().unwrap_or_default()),
        );
        if let Some((upstream_key, _)) = self.upstream_field() {
            input_data.insert(
                upstream_key.to_string(),
                json!(input[upstream_key].as_str().unwrap_or_default()),
            );
        } else {
            input_data.insert(
                "project_description".to_string(),
                json!(input["project_description"].as_str().unwrap_or_default()),
            );
        }
        input_data.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));

        let document = json!({
            "success": true,
            "layer_type": self.layer.as_str(),
            "layer_name": self.layer_title(),
            "description": self.layer_description(),
            "input_data": Value::Object(input_data),
            "parsed_dag": {
                "nodes": [],
                "edges": [],
                "metadata": {
                    "layer": self.layer.as_str(),
                    "focus": self.focus_terms(),
                    "node_count": node_count,
                }
            },
            "validation": {
                "is_valid": true,
                "validation_messages": [format!("{} document received", self.layer_title())],
            }
        });

        let saved = storage.save_dag(document.clone(), None)?;

        let mut result = document;
        result["storage_info"] = json!({
            "file_path": saved.path,
            "dag_id": saved.dag_id,
            "saved_successfully": true,
        });

        // Remember the project for later calls that omit the path
        if let Err(e) = context.path_cache.set_project_path(&project_path) {
            debug!("failed to update path cache: {e:#}");
        }

        debug!(file = %saved.filename, "layer document saved");
        Ok(ToolOutput::text(serde_json::to_string_pretty(&result)?))
    }
}

/// Create the project data directory and its workspace manifest on first
/// use; later calls see the manifest and return immediately.
pub(super) fn ensure_workspace(project_path: &Path, data_dir: &Path) -> Result<()> {
    let manifest = data_dir.join("workspace.json");
    if manifest.exists() {
        return Ok(());
    }

    for sub in ["dags", "backups", "temp", "sessions", "logs"] {
        let dir = data_dir.join(sub);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let config = json!({
        "project_info": {
            "name": project_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            "root_path": project_path,
            "data_path": data_dir,
            "created_at": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "layer_status": {
            "function": "not_started",
            "logic": "not_started",
            "code": "not_started",
            "order": "not_started",
        }
    });
    fs::write(&manifest, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("Failed to write {}", manifest.display()))?;
    Ok(())
}

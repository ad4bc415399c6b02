// Saved-DAG listing tool
//
// Scans the project's stored layer documents and returns them grouped by
// layer, newest first.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dag::DagStorage;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolInputSchema, ToolOutput};

use super::build_layer::DATA_DIR;
use super::resolve_project_path;

pub struct GetSavedDagsTool;

#[async_trait]
impl Tool for GetSavedDagsTool {
    fn name(&self) -> &str {
        "get_saved_dags"
    }

    fn description(&self) -> &str {
        "List all saved DAG layer documents for the project, grouped by layer with the newest \
         first. Leave project_path empty to auto-detect the project root."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: json!({
                "project_path": {
                    "type": "string",
                    "description": "Project root directory; auto-detected when empty"
                }
            }),
            required: Vec::new(),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let provided = input["project_path"].as_str().unwrap_or_default();
        let project_path = resolve_project_path(provided, &context.path_cache);
        let data_dir = project_path.join(DATA_DIR);

        if !data_dir.join("dags").is_dir() {
            let result = json!({
                "success": true,
                "dags": {},
                "message": "No DAG documents have been saved yet",
            });
            return Ok(ToolOutput::text(serde_json::to_string_pretty(&result)?));
        }

        let storage = DagStorage::new(&data_dir)?;
        let mut by_layer: Map<String, Value> = Map::new();
        let mut total_files = 0usize;

        for file in storage.list_dags()? {
            let document = match storage.load_dag(&file.filename) {
                Ok(document) => document,
                Err(e) => {
                    debug!(file = %file.filename, "skipping unreadable DAG file: {e:#}");
                    continue;
                }
            };
            let layer = document
                .get("layer_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();

            let info = json!({
                "file_name": file.filename,
                "file_path": storage.dags_path().join(&file.filename),
                "layer_type": layer,
                "layer_name": document.get("layer_name").cloned().unwrap_or(Value::Null),
                "timestamp": document.get("timestamp").cloned().unwrap_or(Value::Null),
                "file_size": file.size_bytes,
                "dag_data": document,
            });

            if let Some(files) = by_layer
                .entry(layer)
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
            {
                files.push(info);
            }
            total_files += 1;
        }

        let layer_counts: Map<String, Value> = by_layer
            .iter()
            .map(|(layer, files)| {
                (
                    layer.clone(),
                    json!(files.as_array().map_or(0, Vec::len)),
                )
            })
            .collect();
        let layers_found: Vec<&String> = by_layer.keys().collect();

        let result = json!({
            "success": true,
            "project_path": project_path,
            "dags_directory": storage.dags_path(),
            "dags": by_layer,
            "summary": {
                "total_files": total_files,
                "layers_found": layers_found,
                "layer_counts": layer_counts,
            },
            "last_scan": Utc::now().to_rfc3339(),
        });

        Ok(ToolOutput::text(serde_json::to_string_pretty(&result)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::dag::{LayerType, PathCache};
    use crate::feedback::SessionStore;
    use crate::tools::implementations::LayerBuildTool;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_context(dir: &TempDir) -> ToolContext {
        ToolContext {
            path_cache: Arc::new(PathCache::new(dir.path().join("cache.toml"))),
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(ServerConfig::default()),
        }
    }

    #[tokio::test]
    async fn test_empty_project_reports_no_documents() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();

        let output = GetSavedDagsTool
            .execute(
                json!({"project_path": project.display().to_string()}),
                &test_context(&dir),
            )
            .await
            .unwrap();

        let result: Value =
            serde_json::from_str(output.content[0].as_text().unwrap()).unwrap();
        assert_eq!(result["success"], true);
        assert!(result["dags"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lists_saved_documents_grouped_by_layer() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let context = test_context(&dir);

        for layer in [LayerType::Function, LayerType::Logic] {
            LayerBuildTool::new(layer)
                .execute(
                    json!({
                        "project_path": project.display().to_string(),
                        "mermaid_dag": "graph TD\nA-->B",
                    }),
                    &context,
                )
                .await
                .unwrap();
        }

        let output = GetSavedDagsTool
            .execute(
                json!({"project_path": project.display().to_string()}),
                &context,
            )
            .await
            .unwrap();

        let result: Value =
            serde_json::from_str(output.content[0].as_text().unwrap()).unwrap();
        assert_eq!(result["summary"]["total_files"], 2);
        assert_eq!(result["summary"]["layer_counts"]["function"], 1);
        assert_eq!(result["summary"]["layer_counts"]["logic"], 1);
        assert_eq!(result["dags"]["function"][0]["layer_type"], "function");
    }
}

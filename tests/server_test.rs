// Integration tests for the MCP server dispatch

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use stratum::config::ServerConfig;
use stratum::dag::PathCache;
use stratum::feedback::{FeedbackSubmission, SessionStore};
use stratum::server::protocol::METHOD_NOT_FOUND;
use stratum::server::McpServer;
use stratum::tools::{default_registry, ToolContext, ToolExecutor};

fn test_server(dir: &TempDir) -> (McpServer, Arc<SessionStore>) {
    let sessions = Arc::new(SessionStore::new());
    let context = ToolContext {
        path_cache: Arc::new(PathCache::new(dir.path().join("path_cache.toml"))),
        sessions: sessions.clone(),
        config: Arc::new(ServerConfig::default()),
    };
    let server = McpServer::new(ToolExecutor::new(default_registry()), context);
    (server, sessions)
}

fn tool_result_json(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn initialize_reports_server_info_and_capabilities() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);

    let result = server.dispatch("initialize", json!({})).await.unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "stratum");
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tools_list_exposes_the_full_tool_set() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);

    let result = server.dispatch("tools/list", json!({})).await.unwrap();
    let names: Vec<&str> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();

    assert_eq!(
        names,
        [
            "build_function_layer",
            "build_logic_layer",
            "build_code_layer",
            "build_order_layer",
            "get_saved_dags",
            "iterate_dag",
            "interactive_feedback",
            "get_system_info",
        ]
    );
    assert!(result["tools"][0]["inputSchema"]["properties"].is_object());
}

#[tokio::test]
async fn unknown_method_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);

    let error = server.dispatch("bogus/method", json!({})).await.unwrap_err();
    assert_eq!(error.code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn notifications_and_parse_errors_follow_jsonrpc_rules() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);

    // Notifications get no response
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .is_none());

    // Garbage gets a parse error with a null id
    let response = server.handle_line("{not json").await.unwrap();
    let serialized = serde_json::to_value(&response).unwrap();
    assert_eq!(serialized["id"], Value::Null);
    assert_eq!(serialized["error"]["code"], -32700);
}

#[tokio::test]
async fn unknown_tool_call_is_an_error_result_not_a_protocol_fault() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);

    let result = server
        .dispatch("tools/call", json!({"name": "no_such_tool", "arguments": {}}))
        .await
        .unwrap();
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("not found"));
}

#[tokio::test]
async fn build_layer_tool_persists_a_document() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);
    let project = dir.path().join("project");
    fs::create_dir_all(&project).unwrap();

    let result = server
        .dispatch(
            "tools/call",
            json!({
                "name": "build_function_layer",
                "arguments": {
                    "project_path": project.display().to_string(),
                    "mermaid_dag": "graph TD\nA[analyze]-->B[design]",
                    "project_description": "demo",
                    "business_requirements": "collect feedback",
                }
            }),
        )
        .await
        .unwrap();
    assert_eq!(result["isError"], false);

    let document = tool_result_json(&result);
    assert_eq!(document["success"], true);
    assert_eq!(document["layer_type"], "function");
    assert_eq!(document["storage_info"]["saved_successfully"], true);

    let dags_dir = project.join(".stratum").join("dags");
    assert_eq!(fs::read_dir(dags_dir).unwrap().count(), 1);

    // and the listing tool sees it
    let listing = server
        .dispatch(
            "tools/call",
            json!({
                "name": "get_saved_dags",
                "arguments": { "project_path": project.display().to_string() }
            }),
        )
        .await
        .unwrap();
    let listing = tool_result_json(&listing);
    assert_eq!(listing["summary"]["total_files"], 1);
    assert_eq!(listing["summary"]["layer_counts"]["function"], 1);
}

#[tokio::test]
async fn iterate_dag_tool_runs_the_engine_end_to_end() {
    let dir = TempDir::new().unwrap();
    let (server, _) = test_server(&dir);
    let project = dir.path().join("project");
    fs::create_dir_all(&project).unwrap();

    let result = server
        .dispatch(
            "tools/call",
            json!({
                "name": "iterate_dag",
                "arguments": {
                    "project_path": project.display().to_string(),
                    "max_iterations": 2,
                }
            }),
        )
        .await
        .unwrap();
    assert_eq!(result["isError"], false);

    let report = tool_result_json(&result);
    assert_eq!(report["success"], true);
    assert_eq!(report["phase"], "completed");
    assert_eq!(report["iterations"], 2);
    assert_eq!(report["final_metrics"]["total_nodes"], 12);
    assert!(report["mermaid"].as_str().unwrap().contains("graph TD"));
}

#[tokio::test]
async fn interactive_feedback_round_trips_through_the_session_store() {
    let dir = TempDir::new().unwrap();
    let (server, sessions) = test_server(&dir);
    let server = Arc::new(server);
    let project = dir.path().display().to_string();

    let call = tokio::spawn({
        let server = server.clone();
        async move {
            server
                .dispatch(
                    "tools/call",
                    json!({
                        "name": "interactive_feedback",
                        "arguments": {
                            "project_directory": project,
                            "summary": "refactor finished",
                            "timeout": 5,
                        }
                    }),
                )
                .await
        }
    });

    let session = loop {
        if let Some(info) = sessions.active_sessions().pop() {
            break info;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(session.summary, "refactor finished");

    sessions.submit(
        &session.id,
        FeedbackSubmission {
            interactive_feedback: "please add tracing spans".to_string(),
            ..Default::default()
        },
    );

    let result = call.await.unwrap().unwrap();
    assert_eq!(result["isError"], false);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("please add tracing spans"));
}

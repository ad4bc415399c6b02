// Interactive feedback tool
//
// Opens a feedback session for the collecting surface to resolve and waits
// for the user's submission: free text, command logs, and image
// attachments. Times out quietly when nothing arrives.

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::feedback::FeedbackSubmission;
use crate::tools::registry::Tool;
use crate::tools::types::{ContentBlock, ToolContext, ToolInputSchema, ToolOutput};

use super::build_layer::DATA_DIR;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SUMMARY: &str = "The requested task is complete.";

pub struct InteractiveFeedbackTool;

#[async_trait]
impl Tool for InteractiveFeedbackTool {
    fn name(&self) -> &str {
        "interactive_feedback"
    }

    fn description(&self) -> &str {
        "Collect interactive user feedback on completed work. Opens a feedback session and \
         waits for a submission with text, command logs, and images; returns whatever the \
         user provided, or a note that nothing arrived before the timeout."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: json!({
                "project_directory": {
                    "type": "string",
                    "description": "Project directory the feedback refers to"
                },
                "summary": {
                    "type": "string",
                    "description": "Summary of the completed work, shown to the user"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Seconds to wait for the user (default 120)"
                }
            }),
            required: Vec::new(),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let provided = input["project_directory"].as_str().unwrap_or(".");
        let project_directory = normalize_directory(provided);
        let summary = input["summary"].as_str().unwrap_or(DEFAULT_SUMMARY);
        let timeout_secs = input["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);

        let (info, receiver) = context
            .sessions
            .open(&project_directory.display().to_string(), summary);
        debug!(session = %info.id, timeout_secs, "waiting for user feedback");

        let Some(submission) = context
            .sessions
            .wait(&info.id, receiver, Duration::from_secs(timeout_secs))
            .await
        else {
            return Ok(ToolOutput::text(
                "No feedback was provided before the timeout.",
            ));
        };

        // Keep a record next to the project; failure to write is not a
        // failure to collect
        if let Err(e) = save_feedback_record(&project_directory, &info.id, &submission) {
            debug!("failed to record feedback: {e:#}");
        }

        let mut content = vec![ContentBlock::text(format_feedback_text(&submission))];
        for image in &submission.images {
            if image.data.is_empty() {
                continue;
            }
            // Forward only payloads that actually decode
            match BASE64.decode(image.data.as_bytes()) {
                Ok(bytes) if !bytes.is_empty() => content.push(ContentBlock::Image {
                    data: image.data.clone(),
                    mime_type: image.mime_type().to_string(),
                }),
                _ => debug!(name = %image.name, "skipping undecodable image attachment"),
            }
        }

        Ok(ToolOutput::success(content))
    }
}

fn normalize_directory(provided: &str) -> PathBuf {
    let path = Path::new(provided);
    if path.exists() {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

fn save_feedback_record(
    project_directory: &Path,
    session_id: &str,
    submission: &FeedbackSubmission,
) -> Result<()> {
    let sessions_dir = project_directory.join(DATA_DIR).join("sessions");
    fs::create_dir_all(&sessions_dir)?;
    let path = sessions_dir.join(format!("feedback_{session_id}.json"));
    fs::write(&path, serde_json::to_string_pretty(submission)?)?;
    debug!(record = %path.display(), "feedback recorded");
    Ok(())
}

fn format_feedback_text(submission: &FeedbackSubmission) -> String {
    let mut parts = Vec::new();

    if !submission.interactive_feedback.is_empty() {
        parts.push(format!(
            "=== User feedback ===\n{}",
            submission.interactive_feedback
        ));
    }
    if !submission.command_logs.is_empty() {
        parts.push(format!(
            "=== Command logs ===\n{}",
            submission.command_logs
        ));
    }
    if !submission.images.is_empty() {
        let mut lines = vec![format!(
            "=== Image attachments ===\n{} image(s) provided:",
            submission.images.len()
        )];
        for (i, image) in submission.images.iter().enumerate() {
            lines.push(format!(
                "  {}. {} ({})",
                i + 1,
                image.name,
                human_size(image.size)
            ));
        }
        parts.push(lines.join("\n"));
    }

    if parts.is_empty() {
        "No feedback content was provided.".to_string()
    } else {
        parts.join("\n\n")
    }
}

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

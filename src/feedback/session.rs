// Feedback session store
//
// Holds in-flight feedback sessions keyed by id. A tool opens a session and
// awaits its completion; whatever surface collects the user's response
// resolves it through `submit`. Unresolved sessions are discarded when the
// waiting side times out.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// What a user handed back for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    #[serde(default)]
    pub interactive_feedback: String,
    #[serde(default)]
    pub command_logs: String,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub name: String,
    /// Base64-encoded image bytes.
    pub data: String,
    #[serde(default)]
    pub size: u64,
}

impl ImageAttachment {
    /// Infer the MIME type from the attachment's file name. Anything
    /// unrecognized is treated as PNG.
    pub fn mime_type(&self) -> &'static str {
        let name = self.name.to_ascii_lowercase();
        if name.ends_with(".jpg") || name.ends_with(".jpeg") {
            "image/jpeg"
        } else if name.ends_with(".gif") {
            "image/gif"
        } else {
            "image/png"
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub project_directory: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

struct PendingSession {
    info: SessionInfo,
    sender: oneshot::Sender<FeedbackSubmission>,
}

#[derive(Default)]
pub struct SessionStore {
    pending: DashMap<String, PendingSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return its info together with the receiving half.
    pub fn open(
        &self,
        project_directory: &str,
        summary: &str,
    ) -> (SessionInfo, oneshot::Receiver<FeedbackSubmission>) {
        let (sender, receiver) = oneshot::channel();
        let info = SessionInfo {
            id: Uuid::new_v4().to_string(),
            project_directory: project_directory.to_string(),
            summary: summary.to_string(),
            created_at: Utc::now(),
        };
        self.pending.insert(
            info.id.clone(),
            PendingSession {
                info: info.clone(),
                sender,
            },
        );
        (info, receiver)
    }

    /// Resolve a pending session. Returns false when the id is unknown or
    /// the waiter has already gone away.
    pub fn submit(&self, session_id: &str, submission: FeedbackSubmission) -> bool {
        match self.pending.remove(session_id) {
            Some((_, session)) => session.sender.send(submission).is_ok(),
            None => false,
        }
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.pending
            .iter()
            .map(|entry| entry.value().info.clone())
            .collect()
    }

    /// Wait for the session to resolve, or time out and discard it.
    pub async fn wait(
        &self,
        session_id: &str,
        receiver: oneshot::Receiver<FeedbackSubmission>,
        timeout: Duration,
    ) -> Option<FeedbackSubmission> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(submission)) => Some(submission),
            Ok(Err(_)) => None,
            Err(_) => {
                self.pending.remove(session_id);
                None
            }
        }
    }
}

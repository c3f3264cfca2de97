//! Core data models: channel events, handoff outcomes, and error types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// Capture request kinds offered on the watched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Full,
    Clip,
    Audio,
}

impl CaptureKind {
    pub const ALL: [CaptureKind; 3] = [CaptureKind::Full, CaptureKind::Clip, CaptureKind::Audio];

    /// Name used on the wire (`downloadType` in capture submissions).
    pub fn wire_name(&self) -> &'static str {
        match self {
            CaptureKind::Full => "full",
            CaptureKind::Clip => "clip",
            CaptureKind::Audio => "audio",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "full" => Some(CaptureKind::Full),
            "clip" => Some(CaptureKind::Clip),
            "audio" => Some(CaptureKind::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Events surfaced to subscribers of the bridge channel.
///
/// `Connected`/`Disconnected` are synthesized by the channel client itself;
/// everything else is decoded from backend envelopes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
    Percentage { percentage: String },
    DownloadStarted { url: String },
    DownloadComplete { data: Value },
    /// Legacy completion event without a payload.
    DownloadCompleteLegacy,
    DownloadError { url: String, error: String },
    DownloadFailed { error: String, message: Option<String> },
    DownloadCancelled,
    ImportVideo { path: String },
    RequestProjectPath,
}

impl ChannelEvent {
    /// Decode a named backend event. Returns `None` for unknown names or
    /// payloads missing required fields; the caller decides how to log.
    pub fn decode(event: &str, data: &Value) -> Option<ChannelEvent> {
        match event {
            "percentage" => Some(ChannelEvent::Percentage {
                percentage: value_as_text(data.get("percentage")?)?,
            }),
            "download_started" => Some(ChannelEvent::DownloadStarted {
                url: data.get("url")?.as_str()?.to_string(),
            }),
            "download_complete" => Some(ChannelEvent::DownloadComplete { data: data.clone() }),
            "download-complete" => Some(ChannelEvent::DownloadCompleteLegacy),
            "download_error" => Some(ChannelEvent::DownloadError {
                url: data.get("url")?.as_str()?.to_string(),
                error: data.get("error")?.as_str()?.to_string(),
            }),
            "download-failed" => Some(ChannelEvent::DownloadFailed {
                error: data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("download failed")
                    .to_string(),
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            "download-cancelled" => Some(ChannelEvent::DownloadCancelled),
            "import_video" => Some(ChannelEvent::ImportVideo {
                path: data.get("path")?.as_str()?.to_string(),
            }),
            "request_project_path" => Some(ChannelEvent::RequestProjectPath),
            _ => None,
        }
    }
}

/// Progress percentages arrive either as numbers or preformatted strings.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Events the bridge emits back to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    ImportComplete {
        success: bool,
        path: String,
        error: Option<String>,
        project_item: Option<String>,
    },
    ProjectPathResponse {
        path: Option<String>,
    },
    CancelDownload {
        kind: CaptureKind,
    },
}

impl OutboundEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundEvent::ImportComplete { .. } => "import_complete",
            OutboundEvent::ProjectPathResponse { .. } => "project_path_response",
            OutboundEvent::CancelDownload { .. } => "cancel-download",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            OutboundEvent::ImportComplete {
                success,
                path,
                error,
                project_item,
            } => {
                let mut payload = json!({ "success": success, "path": path });
                if let Some(error) = error {
                    payload["error"] = json!(error);
                }
                if let Some(item) = project_item {
                    payload["projectItem"] = json!(item);
                }
                payload
            }
            OutboundEvent::ProjectPathResponse { path } => json!({ "path": path }),
            OutboundEvent::CancelDownload { kind } => json!({ "type": kind.wire_name() }),
        }
    }

    pub fn encode(&self) -> String {
        json!({ "event": self.event_name(), "data": self.payload() }).to_string()
    }
}

/// Wire envelope carried over the channel in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn decode(text: &str) -> Option<Envelope> {
        serde_json::from_str(text).ok()
    }
}

/// Normalized result of one scripting-runtime handoff.
///
/// The callable side reports one of three shapes: the literal `"true"`, a
/// literal failure (`"false"` or `"Error: ..."`), or a JSON object with an
/// explicit success flag. All of them collapse into this structure; text
/// that matches none of the shapes is a failure, never a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        rename = "projectItem",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_item: Option<String>,
}

impl HandoffOutcome {
    pub fn succeeded() -> Self {
        HandoffOutcome {
            success: true,
            path: None,
            error: None,
            project_item: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        HandoffOutcome {
            success: false,
            path: None,
            error: Some(error.into()),
            project_item: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path.get_or_insert(path.into());
        self
    }

    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == "true" {
            return HandoffOutcome::succeeded();
        }
        if trimmed == "false" {
            return HandoffOutcome {
                success: false,
                path: None,
                error: None,
                project_item: None,
            };
        }
        if let Some(message) = trimmed.strip_prefix("Error: ") {
            return HandoffOutcome::failure(message);
        }
        if trimmed.starts_with('{') {
            if let Ok(outcome) = serde_json::from_str::<StructuredOutcome>(trimmed) {
                return HandoffOutcome {
                    success: outcome.success,
                    path: outcome.path,
                    error: outcome.error,
                    project_item: outcome.project_item,
                };
            }
        }
        HandoffOutcome::failure(trimmed)
    }
}

/// Structured shape of a scripted result, prior to normalization.
#[derive(Debug, Deserialize)]
struct StructuredOutcome {
    success: bool,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "projectItem")]
    project_item: Option<String>,
}

/// One in-flight request to place a downloaded file into the open project.
#[derive(Debug, Clone)]
pub struct PendingImport {
    pub id: Uuid,
    pub path: String,
    pub requested_at: DateTime<Utc>,
}

impl PendingImport {
    pub fn new(path: impl Into<String>) -> Self {
        PendingImport {
            id: Uuid::new_v4(),
            path: path.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Import error: {0}")]
    Import(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

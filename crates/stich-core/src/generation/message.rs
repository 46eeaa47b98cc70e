//! Stream message types.
//!
//! Messages are the discrete events appended to `messages/{sessionId}`.

use super::model::{GeneratedFile, GenerationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of a stream message, tagged by `type` with the body under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamPayload {
    /// A phase change or progress tick.
    Progress {
        status: GenerationStatus,
        progress: u8,
        #[serde(rename = "currentStep")]
        current_step: String,
    },
    /// A single file became available.
    File(GeneratedFile),
    /// The run finished; carries every produced file.
    Complete { files: Vec<GeneratedFile> },
    /// The run failed.
    Error { message: String },
}

/// Discriminant of a [`StreamPayload`], handy for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMessageType {
    Progress,
    File,
    Complete,
    Error,
}

/// A single entry of the message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(flatten)]
    pub payload: StreamPayload,
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    pub fn new(payload: StreamPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(status: GenerationStatus, progress: u8, current_step: impl Into<String>) -> Self {
        Self::new(StreamPayload::Progress {
            status,
            progress,
            current_step: current_step.into(),
        })
    }

    pub fn file(file: GeneratedFile) -> Self {
        Self::new(StreamPayload::File(file))
    }

    pub fn complete(files: Vec<GeneratedFile>) -> Self {
        Self::new(StreamPayload::Complete { files })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StreamPayload::Error {
            message: message.into(),
        })
    }

    pub fn message_type(&self) -> StreamMessageType {
        match self.payload {
            StreamPayload::Progress { .. } => StreamMessageType::Progress,
            StreamPayload::File(_) => StreamMessageType::File,
            StreamPayload::Complete { .. } => StreamMessageType::Complete,
            StreamPayload::Error { .. } => StreamMessageType::Error,
        }
    }
}

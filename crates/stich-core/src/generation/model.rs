//! Generation session domain model.
//!
//! A `GenerationSession` is the single live record stored at
//! `generations/{sessionId}`. Every write replaces the whole record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a generation session.
///
/// Sessions walk forward through
/// `Initializing → Analyzing → Generating → Reviewing → {Completed | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenerationStatus {
    Initializing,
    Analyzing,
    Generating,
    Reviewing,
    Completed,
    Error,
}

impl GenerationStatus {
    /// Position in the lifecycle. Both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::Analyzing => 1,
            Self::Generating => 2,
            Self::Reviewing => 3,
            Self::Completed | Self::Error => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether moving from `self` to `next` is a forward (or same-phase)
    /// step. Writes are never validated against this; it exists for callers
    /// that want to check an observed sequence.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        // Error may be entered from any live phase.
        next == Self::Error || next.rank() >= self.rank()
    }
}

/// A file produced by a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub name: String,
    pub path: String,
    pub content: String,
    pub language: String,
}

impl GeneratedFile {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            content: content.into(),
            language: language.into(),
        }
    }
}

/// The per-session progress document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSession {
    pub session_id: String,
    pub user_id: String,
    pub status: GenerationStatus,
    /// 0-100. Not validated for monotonicity.
    pub progress: u8,
    pub current_step: String,
    /// Accumulated as generation proceeds; omitted until the first file exists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<GeneratedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Writer-side clock.
    pub timestamp: DateTime<Utc>,
    /// Store-side clock, set once on creation.
    pub created_at: DateTime<Utc>,
    /// Store-side clock, set on every write.
    pub updated_at: DateTime<Utc>,
}

impl GenerationSession {
    /// Builds the record written when a session starts.
    pub fn initializing(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        server_time: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            status: GenerationStatus::Initializing,
            progress: 0,
            current_step: "Initializing generation...".to_string(),
            files: Vec::new(),
            error: None,
            timestamp: Utc::now(),
            created_at: server_time,
            updated_at: server_time,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

//! UI-facing generation state and its reduction rules.

use serde::Serialize;
use stich_core::generation::{GenerationSession, StreamMessage};

/// The single state object a UI renders from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub is_generating: bool,
    /// Latest session record, replaced wholesale on every update.
    pub progress: Option<GenerationSession>,
    pub messages: Vec<StreamMessage>,
    pub error: Option<String>,
}

impl GenerationState {
    /// State right after a generation is started or resumed.
    pub fn generating() -> Self {
        Self {
            is_generating: true,
            ..Self::default()
        }
    }

    /// Applies a session record: replaces `progress`, recomputes `error`
    /// from the record and stops generating on a terminal status.
    pub fn apply_progress(&mut self, session: GenerationSession) {
        self.error = session.error.clone();
        if session.is_terminal() {
            self.is_generating = false;
        }
        self.progress = Some(session);
    }

    /// Appends a message, evicting the oldest ones past `limit`.
    pub fn apply_message(&mut self, message: StreamMessage, limit: Option<usize>) {
        self.messages.push(message);
        if let Some(limit) = limit {
            if self.messages.len() > limit {
                let excess = self.messages.len() - limit;
                self.messages.drain(..excess);
            }
        }
    }
}

//! Generation domain module.
//!
//! # Module Structure
//!
//! - `model`: the session record (`GenerationSession`) and its status
//! - `message`: stream messages appended to the message log
//! - `session_id`: id generation for new sessions
//! - `progress_store`: typed access to `generations/{sessionId}`
//! - `message_log`: typed access to `messages/{sessionId}`

mod message;
mod message_log;
mod model;
mod progress_store;
mod session_id;

pub use message::{StreamMessage, StreamMessageType, StreamPayload};
pub use message_log::MessageLog;
pub use model::{GeneratedFile, GenerationSession, GenerationStatus};
pub use progress_store::ProgressStore;
pub use session_id::generate_session_id;

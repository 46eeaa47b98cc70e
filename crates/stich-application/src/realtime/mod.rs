//! Realtime generation service.
//!
//! - `service`: session lifecycle, subscriptions and orchestration
//! - `script`: the phases and synthetic files of a scripted run

pub mod script;
mod service;

pub use script::GenerationScript;
pub use service::{GenerationOutcome, MessageCallback, ProgressCallback, RealtimeService};

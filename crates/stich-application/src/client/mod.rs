//! Consumer-side generation state.
//!
//! - `state`: the UI-facing state object and its reduction rules
//! - `generation_client`: subscription lifecycle around one session

mod generation_client;
mod state;

pub use generation_client::GenerationClient;
pub use state::GenerationState;

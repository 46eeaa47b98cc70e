//! Application layer for Stich.
//!
//! Coordinates the generation domain: the realtime service that drives and
//! publishes generation runs, and the client that reduces those publications
//! into UI state.

pub mod client;
pub mod realtime;

pub use client::{GenerationClient, GenerationState};
pub use realtime::{GenerationOutcome, RealtimeService};

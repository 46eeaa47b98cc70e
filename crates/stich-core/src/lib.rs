//! Core domain for Stich generation sessions.
//!
//! Holds the session and message models, the document store contract, the
//! typed progress store and message log built on it, the configuration model
//! and the shared error type.

pub mod config;
pub mod error;
pub mod generation;
pub mod store;

// Re-export common error type
pub use error::{Result, StichError};

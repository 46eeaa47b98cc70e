//! Document store contract.
//!
//! The store itself is an external collaborator; this module only defines
//! what the generation subsystem consumes from it.

mod document;
pub mod paths;
mod subscription;

pub use document::{DocumentStore, Listener};
pub use subscription::Subscription;

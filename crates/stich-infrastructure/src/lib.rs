//! Infrastructure layer for Stich.
//!
//! Concrete document store, path resolution, configuration loading and
//! tracing setup.

pub mod config_service;
pub mod logging;
pub mod memory_store;
pub mod paths;

pub use crate::config_service::ConfigService;
pub use crate::memory_store::InMemoryDocumentStore;
pub use crate::paths::StichPaths;

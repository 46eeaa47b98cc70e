//! Document store trait.
//!
//! Defines the interface to the key-value document store that holds session
//! records and message logs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::subscription::Subscription;
use crate::error::Result;

/// Callback invoked with the current value at a subscribed path.
///
/// `None` means nothing is stored at the path.
pub type Listener = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// An abstract hierarchical document store.
///
/// Paths are `/`-separated. Reading a path that has children but no value of
/// its own yields an object keyed by child segment.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Treat `set` as a full replace of the value at the path
/// - Notify listeners on the written path and on every ancestor path
/// - Invoke a new listener once promptly with the current value
/// - Dispatch asynchronously; several writes landing before a dispatch may be
///   coalesced into one invocation carrying the latest snapshot
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the value at `path`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: A value (or a set of children) exists
    /// - `Ok(None)`: Nothing stored at or under the path
    /// - `Err(_)`: The read failed
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replaces the value at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Registers a push listener on `path`.
    ///
    /// The returned handle disposes the listener.
    async fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription>;

    /// One-shot read without an ongoing subscription.
    async fn once(&self, path: &str) -> Result<Option<Value>> {
        self.get(path).await
    }

    /// Trusted write time, used for `createdAt` / `updatedAt`.
    fn server_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

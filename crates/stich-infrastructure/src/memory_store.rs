//! In-process document store with push listeners.
//!
//! Documents live in a path-keyed `BTreeMap`. Each listener owns a dispatch
//! task fed by a `watch` channel, so bursts of writes between two dispatches
//! collapse into a single invocation carrying the latest snapshot.
//!
//! ```text
//! set(path) ──► documents ──► bump watch of every listener on path / ancestors
//!                                      │
//!                        dispatch task ▼  read snapshot ──► listener(snapshot)
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use stich_core::error::Result;
use stich_core::store::paths::is_within;
use stich_core::store::{DocumentStore, Listener, Subscription};
use tokio::sync::watch;

/// A `DocumentStore` kept entirely in memory.
///
/// Cloning yields another handle to the same documents.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    documents: RwLock<BTreeMap<String, Value>>,
    listeners: Mutex<Vec<ListenerEntry>>,
}

struct ListenerEntry {
    path: String,
    subscription: Subscription,
    notify: watch::Sender<u64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners that have not been disposed yet.
    pub fn active_listener_count(&self) -> usize {
        let listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners
            .iter()
            .filter(|entry| entry.subscription.is_active())
            .count()
    }

    /// Number of stored leaf documents.
    pub fn document_count(&self) -> usize {
        self.inner
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl StoreInner {
    fn snapshot(&self, path: &str) -> Option<Value> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = documents.get(path) {
            return Some(value.clone());
        }

        let prefix = format!("{}/", path);
        let mut root = Map::new();
        for (key, value) in documents.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            insert_nested(&mut root, rest, value.clone());
        }

        if root.is_empty() {
            None
        } else {
            Some(Value::Object(root))
        }
    }

    fn write(&self, path: &str, value: Value) {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);

        // Full replace: children of the path and leaf values above it go away.
        documents.retain(|key, _| !(is_within(key, path) || is_within(path, key)));
        if !value.is_null() {
            documents.insert(path.to_string(), value);
        }
    }

    fn notify(&self, written: &str) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|entry| entry.subscription.is_active());
        for entry in listeners.iter() {
            if is_within(written, &entry.path) || is_within(&entry.path, written) {
                entry.notify.send_modify(|version| *version += 1);
            }
        }
    }

    fn remove_listener(&self, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|entry| entry.subscription.id() != id);
    }
}

fn insert_nested(node: &mut Map<String, Value>, rest: &str, value: Value) {
    match rest.split_once('/') {
        None => {
            node.insert(rest.to_string(), value);
        }
        Some((head, tail)) => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_nested(child, tail, value);
            }
        }
    }
}

async fn dispatch(
    store: Weak<StoreInner>,
    path: String,
    subscription: Subscription,
    mut changes: watch::Receiver<u64>,
    listener: Listener,
) {
    loop {
        changes.borrow_and_update();
        let snapshot = match store.upgrade() {
            Some(inner) => inner.snapshot(&path),
            None => break,
        };
        if !subscription.is_active() {
            break;
        }
        listener(snapshot);

        tokio::select! {
            _ = subscription.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(inner) = store.upgrade() {
        inner.remove_listener(subscription.id());
    }
    tracing::trace!(path = %path, id = subscription.id(), "Listener dispatch finished");
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.inner.snapshot(path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        tracing::debug!(path = %path, "Store write");
        self.inner.write(path, value);
        self.inner.notify(path);
        Ok(())
    }

    async fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription> {
        let subscription = Subscription::new(path);
        let (notify, changes) = watch::channel(0u64);

        {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.push(ListenerEntry {
                path: path.to_string(),
                subscription: subscription.clone(),
                notify,
            });
        }

        tracing::debug!(path = %path, id = subscription.id(), "Listener registered");
        tokio::spawn(dispatch(
            Arc::downgrade(&self.inner),
            path.to_string(),
            subscription.clone(),
            changes,
            listener,
        ));

        Ok(subscription)
    }
}

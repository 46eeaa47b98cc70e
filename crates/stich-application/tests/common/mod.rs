#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stich_application::RealtimeService;
use stich_core::config::{GenerationSettings, MessageDelivery};
use stich_core::error::{Result, StichError};
use stich_core::store::{DocumentStore, Listener, Subscription};
use stich_infrastructure::InMemoryDocumentStore;

pub fn settings(delivery: MessageDelivery) -> GenerationSettings {
    GenerationSettings {
        message_delivery: delivery,
        ..GenerationSettings::default()
    }
}

pub fn service_over(store: Arc<dyn DocumentStore>, settings: GenerationSettings) -> Arc<RealtimeService> {
    Arc::new(RealtimeService::new(store, settings))
}

pub fn memory_service() -> (InMemoryDocumentStore, Arc<RealtimeService>) {
    let store = InMemoryDocumentStore::new();
    let service = service_over(
        Arc::new(store.clone()),
        settings(MessageDelivery::Latest),
    );
    (store, service)
}

/// Lets pending dispatch tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Waits past the end of a full default run, grace period included.
pub async fn run_to_end() {
    tokio::time::sleep(Duration::from_secs(15)).await;
}

pub fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |item| sink.lock().unwrap().push(item))
}

/// Rejects record writes once file generation reaches 50%.
pub struct FailingStore {
    inner: InMemoryDocumentStore,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
        }
    }

    fn rejects(path: &str, value: &Value) -> bool {
        path.starts_with("generations/")
            && value["status"] == "generating"
            && value["progress"].as_u64().is_some_and(|p| p >= 50)
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        if Self::rejects(path, &value) {
            return Err(StichError::store("write rejected"));
        }
        self.inner.set(path, value).await
    }

    async fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription> {
        self.inner.subscribe(path, listener).await
    }
}

/// Refuses listeners on the message log; everything else passes through.
pub struct MessageSubscribeRejectingStore {
    pub inner: InMemoryDocumentStore,
}

impl MessageSubscribeRejectingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for MessageSubscribeRejectingStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.inner.set(path, value).await
    }

    async fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription> {
        if path.starts_with("messages/") {
            return Err(StichError::store("listener rejected"));
        }
        self.inner.subscribe(path, listener).await
    }
}

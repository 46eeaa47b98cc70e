//! Message log.
//!
//! Append-only, key-ordered list of [`StreamMessage`]s stored under
//! `messages/{sessionId}/{writeKey}`.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::message::StreamMessage;
use crate::config::MessageDelivery;
use crate::error::Result;
use crate::store::paths::{message_entry_path, messages_path, next_message_key, validate_segment};
use crate::store::{DocumentStore, Listener, Subscription};

#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn DocumentStore>,
}

impl MessageLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Appends a message and returns the key it was stored under.
    pub async fn append(&self, session_id: &str, message: &StreamMessage) -> Result<String> {
        validate_segment(session_id)?;
        let key = next_message_key();
        self.store
            .set(
                &message_entry_path(session_id, &key),
                serde_json::to_value(message)?,
            )
            .await?;
        tracing::debug!(
            session_id = %session_id,
            key = %key,
            message_type = ?message.message_type(),
            "Appended stream message"
        );
        Ok(key)
    }

    /// Every stored message in key order. Undecodable entries are logged
    /// and skipped, as they are for subscribers.
    pub async fn list(&self, session_id: &str) -> Result<Vec<(String, StreamMessage)>> {
        validate_segment(session_id)?;
        let path = messages_path(session_id);
        let snapshot = self.store.once(&path).await?;
        Ok(sorted_entries(snapshot)
            .into_iter()
            .filter_map(|(key, value)| {
                decode_entry(&path, &key, value).map(|message| (key, message))
            })
            .collect())
    }

    /// Pushes log entries to `callback` according to `delivery`.
    ///
    /// With [`MessageDelivery::Latest`] each dispatch delivers only the
    /// lexicographically-last entry, so entries appended between two
    /// dispatches are skipped. With [`MessageDelivery::Every`] the listener
    /// keeps a cursor and delivers every entry past it, in order.
    pub async fn subscribe<F>(
        &self,
        session_id: &str,
        delivery: MessageDelivery,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(StreamMessage) + Send + Sync + 'static,
    {
        validate_segment(session_id)?;
        let path = messages_path(session_id);
        let cursor: Mutex<Option<String>> = Mutex::new(None);
        let listener_path = path.clone();

        let listener: Listener = Arc::new(move |snapshot| {
            let entries = sorted_entries(snapshot);
            let pending = {
                let mut cursor = match cursor.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let pending = select_pending(entries, cursor.as_deref(), delivery);
                if let Some((key, _)) = pending.last() {
                    *cursor = Some(key.clone());
                }
                pending
            };

            for (key, value) in pending {
                if let Some(message) = decode_entry(&listener_path, &key, value) {
                    callback(message);
                }
            }
        });

        self.store.subscribe(&path, listener).await
    }
}

fn decode_entry(path: &str, key: &str, value: Value) -> Option<StreamMessage> {
    match serde_json::from_value::<StreamMessage>(value) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(
                path = %path,
                key = %key,
                error = %e,
                "Skipping undecodable stream message"
            );
            None
        }
    }
}

/// Flattens a log snapshot into `(key, value)` pairs sorted by key.
fn sorted_entries(snapshot: Option<Value>) -> Vec<(String, Value)> {
    let mut entries: Vec<(String, Value)> = match snapshot {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Vec::new(),
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn select_pending(
    entries: Vec<(String, Value)>,
    cursor: Option<&str>,
    delivery: MessageDelivery,
) -> Vec<(String, Value)> {
    let newer = |key: &str| cursor.is_none_or(|c| key > c);
    match delivery {
        MessageDelivery::Latest => entries
            .into_iter()
            .last()
            .filter(|(key, _)| newer(key.as_str()))
            .into_iter()
            .collect(),
        MessageDelivery::Every => entries.into_iter().filter(|(key, _)| newer(key.as_str())).collect(),
    }
}

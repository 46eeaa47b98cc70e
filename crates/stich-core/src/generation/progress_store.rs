//! Progress store.
//!
//! Typed access to the session record at `generations/{sessionId}`.

use std::sync::Arc;

use super::model::GenerationSession;
use crate::error::Result;
use crate::store::paths::{generation_path, validate_segment};
use crate::store::{DocumentStore, Listener, Subscription};

/// Reads and writes [`GenerationSession`] records.
#[derive(Clone)]
pub struct ProgressStore {
    store: Arc<dyn DocumentStore>,
}

impl ProgressStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Writes the initial `initializing` record for a session, replacing
    /// whatever was stored under that id before.
    pub async fn create(&self, session_id: &str, user_id: &str) -> Result<GenerationSession> {
        validate_segment(session_id)?;
        let session = GenerationSession::initializing(session_id, user_id, self.store.server_time());
        self.store
            .set(&generation_path(session_id), serde_json::to_value(&session)?)
            .await?;
        Ok(session)
    }

    /// Full overwrite of a session record. `updated_at` is stamped with the
    /// store's clock before writing.
    pub async fn write(&self, session: &GenerationSession) -> Result<()> {
        validate_segment(&session.session_id)?;
        let mut session = session.clone();
        session.updated_at = self.store.server_time();

        tracing::debug!(
            session_id = %session.session_id,
            status = %session.status,
            progress = session.progress,
            "Writing generation record"
        );

        self.store
            .set(
                &generation_path(&session.session_id),
                serde_json::to_value(&session)?,
            )
            .await
    }

    /// One-shot read of a session record.
    pub async fn load(&self, session_id: &str) -> Result<Option<GenerationSession>> {
        validate_segment(session_id)?;
        match self.store.once(&generation_path(session_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Pushes every readable snapshot of the session record to `callback`.
    ///
    /// Missing records are not delivered; undecodable ones are logged and
    /// skipped.
    pub async fn subscribe<F>(&self, session_id: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(GenerationSession) + Send + Sync + 'static,
    {
        validate_segment(session_id)?;
        let path = generation_path(session_id);
        let listener_path = path.clone();
        let listener: Listener = Arc::new(move |value| {
            let Some(value) = value else {
                return;
            };
            match serde_json::from_value::<GenerationSession>(value) {
                Ok(session) => callback(session),
                Err(e) => tracing::warn!(
                    path = %listener_path,
                    error = %e,
                    "Skipping undecodable generation record"
                ),
            }
        });
        self.store.subscribe(&path, listener).await
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stich_core::config::GenerationSettings;
use stich_core::error::Result;
use stich_core::generation::{
    GeneratedFile, GenerationSession, GenerationStatus, MessageLog, ProgressStore, StreamMessage,
};
use stich_core::store::{DocumentStore, Subscription};
use tokio_util::sync::CancellationToken;

use super::script::{self, COMPLETED_PROGRESS, GenerationScript, Phase};

/// Callback receiving session record snapshots.
pub type ProgressCallback = Arc<dyn Fn(GenerationSession) + Send + Sync>;

/// Callback receiving stream messages.
pub type MessageCallback = Arc<dyn Fn(StreamMessage) + Send + Sync>;

/// How a `stream_generation` run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed { files: Vec<GeneratedFile> },
    /// The script failed; the session record was moved to `error`.
    Failed { message: String },
    /// The cancellation token fired between phases.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Feed {
    Progress,
    Messages,
}

/// Subscriptions the service handed out, keyed by session and feed.
#[derive(Default)]
struct SubscriptionTracker {
    current: HashMap<(String, Feed), Subscription>,
    /// Handles displaced by a later subscribe for the same key. Kept so
    /// `disconnect_all` still reaches them.
    superseded: Vec<(String, Subscription)>,
}

impl SubscriptionTracker {
    fn track(&mut self, session_id: &str, feed: Feed, subscription: Subscription) {
        self.prune();
        let key = (session_id.to_string(), feed);
        if let Some(previous) = self.current.insert(key, subscription) {
            if previous.is_active() {
                tracing::warn!(
                    session_id = %session_id,
                    feed = ?feed,
                    previous = previous.id(),
                    "Replacing a live subscription; the previous listener keeps firing until released"
                );
                self.superseded.push((session_id.to_string(), previous));
            }
        }
    }

    fn release_session(&mut self, session_id: &str) -> Vec<Subscription> {
        let mut released = Vec::new();
        for feed in [Feed::Progress, Feed::Messages] {
            if let Some(subscription) = self.current.remove(&(session_id.to_string(), feed)) {
                released.push(subscription);
            }
        }
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.superseded)
            .into_iter()
            .partition(|(id, _)| id == session_id);
        self.superseded = rest;
        released.extend(matching.into_iter().map(|(_, subscription)| subscription));
        released
    }

    /// Releases exactly `subscriptions`, leaving newer handles for the same
    /// session alone.
    fn release_handles(&mut self, subscriptions: &[Subscription]) {
        let ids: Vec<u64> = subscriptions.iter().map(Subscription::id).collect();
        self.current
            .retain(|_, subscription| !ids.contains(&subscription.id()));
        self.superseded
            .retain(|(_, subscription)| !ids.contains(&subscription.id()));
    }

    /// Forgets handles that were disposed without going through the tracker.
    fn prune(&mut self) {
        self.current.retain(|_, subscription| subscription.is_active());
        self.superseded
            .retain(|(_, subscription)| subscription.is_active());
    }

    fn drain(&mut self) -> Vec<Subscription> {
        let mut all: Vec<Subscription> = self.current.drain().map(|(_, s)| s).collect();
        all.extend(self.superseded.drain(..).map(|(_, s)| s));
        all
    }

    fn len(&self) -> usize {
        self.current.len() + self.superseded.len()
    }
}

/// Coordinates every generation session in the process.
///
/// Construct it once and hand the `Arc` to whoever needs it.
///
/// The service is the only writer of session records and message logs. It
/// never validates status transitions or progress monotonicity; the script
/// orders them.
pub struct RealtimeService {
    progress_store: ProgressStore,
    message_log: MessageLog,
    settings: GenerationSettings,
    script: GenerationScript,
    tracker: Arc<Mutex<SubscriptionTracker>>,
}

impl RealtimeService {
    /// Creates a new `RealtimeService` over a document store.
    ///
    /// # Arguments
    ///
    /// * `store` - Backend holding session records and message logs
    /// * `settings` - Delays, grace period and delivery policy
    pub fn new(store: Arc<dyn DocumentStore>, settings: GenerationSettings) -> Self {
        let script = GenerationScript::from_settings(&settings);
        Self::with_script(store, settings, script)
    }

    /// Same as [`RealtimeService::new`] with an explicit script.
    pub fn with_script(
        store: Arc<dyn DocumentStore>,
        settings: GenerationSettings,
        script: GenerationScript,
    ) -> Self {
        Self {
            progress_store: ProgressStore::new(store.clone()),
            message_log: MessageLog::new(store),
            settings,
            script,
            tracker: Arc::new(Mutex::new(SubscriptionTracker::default())),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.message_log
    }

    // ============================================================================
    // Progress store operations
    // ============================================================================

    /// Writes the initial record: `initializing`, progress 0.
    pub async fn start_generation_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        tracing::info!(session_id = %session_id, user_id = %user_id, "Starting generation session");
        self.progress_store.create(session_id, user_id).await?;
        Ok(())
    }

    /// Overwrites the mutable fields of a session record.
    ///
    /// `files: None` keeps whatever files the record already has. Owner and
    /// creation time are carried over from the stored record.
    pub async fn update_progress(
        &self,
        session_id: &str,
        status: GenerationStatus,
        progress: u8,
        current_step: &str,
        files: Option<Vec<GeneratedFile>>,
    ) -> Result<()> {
        let mut session = self.current_record(session_id).await?;
        session.status = status;
        session.progress = progress;
        session.current_step = current_step.to_string();
        if let Some(files) = files {
            session.files = files;
        }
        session.error = None;
        session.timestamp = chrono::Utc::now();
        self.progress_store.write(&session).await
    }

    /// Marks a session `completed` at 100%.
    pub async fn complete_generation(&self, session_id: &str, files: Vec<GeneratedFile>) -> Result<()> {
        tracing::info!(session_id = %session_id, files = files.len(), "Generation completed");
        self.update_progress(
            session_id,
            GenerationStatus::Completed,
            COMPLETED_PROGRESS,
            "Generation completed!",
            Some(files),
        )
        .await
    }

    /// Marks a session `error`, resetting progress to 0.
    pub async fn error_generation(&self, session_id: &str, message: &str) -> Result<()> {
        tracing::error!(session_id = %session_id, error = %message, "Generation failed");
        let mut session = self.current_record(session_id).await?;
        session.status = GenerationStatus::Error;
        session.progress = 0;
        session.current_step = "Generation failed".to_string();
        session.error = Some(message.to_string());
        session.timestamp = chrono::Utc::now();
        self.progress_store.write(&session).await
    }

    /// One-shot read of a session record.
    pub async fn get_generation_status(&self, session_id: &str) -> Result<Option<GenerationSession>> {
        self.progress_store.load(session_id).await
    }

    /// Stored record, or a fresh one when the session was never started so
    /// that every write still carries the complete document.
    async fn current_record(&self, session_id: &str) -> Result<GenerationSession> {
        match self.progress_store.load(session_id).await? {
            Some(session) => Ok(session),
            None => {
                tracing::warn!(session_id = %session_id, "Updating a session that was never started");
                Ok(GenerationSession::initializing(
                    session_id,
                    "",
                    chrono::Utc::now(),
                ))
            }
        }
    }

    // ============================================================================
    // Subscriptions
    // ============================================================================

    /// Pushes the session record to `callback` now and after every write.
    ///
    /// The handle is tracked per session id. Subscribing again for the same
    /// id replaces the tracked handle without disposing the old listener;
    /// only `unsubscribe`, `disconnect_all` or the old handle itself stop it.
    pub async fn subscribe_to_generation<F>(&self, session_id: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(GenerationSession) + Send + Sync + 'static,
    {
        let subscription = self.progress_store.subscribe(session_id, callback).await?;
        self.lock_tracker()
            .track(session_id, Feed::Progress, subscription.clone());
        Ok(subscription)
    }

    /// Appends a message to the session's log.
    pub async fn send_message(&self, session_id: &str, message: StreamMessage) -> Result<()> {
        self.message_log.append(session_id, &message).await?;
        Ok(())
    }

    /// Pushes log entries to `callback` under the configured delivery
    /// policy. Tracked like [`RealtimeService::subscribe_to_generation`].
    pub async fn subscribe_to_messages<F>(&self, session_id: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(StreamMessage) + Send + Sync + 'static,
    {
        let subscription = self
            .message_log
            .subscribe(session_id, self.settings.message_delivery, callback)
            .await?;
        self.lock_tracker()
            .track(session_id, Feed::Messages, subscription.clone());
        Ok(subscription)
    }

    /// Disposes every tracked handle for one session.
    pub async fn unsubscribe(&self, session_id: &str) {
        let released = self.lock_tracker().release_session(session_id);
        for subscription in released {
            subscription.unsubscribe();
        }
    }

    /// Disposes exactly `subscriptions` and stops tracking them. Other
    /// handles for the same sessions are left alone.
    pub fn release(&self, subscriptions: &[Subscription]) {
        self.lock_tracker().release_handles(subscriptions);
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Disposes every tracked handle.
    pub async fn disconnect_all(&self) {
        self.disconnect_tracked();
    }

    /// Synchronous body of [`RealtimeService::disconnect_all`], usable from
    /// `Drop`.
    pub(crate) fn disconnect_tracked(&self) {
        let released = self.lock_tracker().drain();
        tracing::debug!(count = released.len(), "Disconnecting all listeners");
        for subscription in released {
            subscription.unsubscribe();
        }
    }

    /// Number of handles currently tracked (including superseded ones).
    pub async fn tracked_subscription_count(&self) -> usize {
        self.lock_tracker().len()
    }

    fn lock_tracker(&self) -> MutexGuard<'_, SubscriptionTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Placeholder: records and logs are kept; nothing is deleted in-band.
    pub async fn cleanup_session(&self, session_id: &str) {
        tracing::debug!(session_id = %session_id, "Session cleanup requested; records are retained");
    }

    // ============================================================================
    // Orchestration
    // ============================================================================

    /// Runs a full scripted generation for `session_id`.
    ///
    /// See [`RealtimeService::stream_generation_with_cancel`].
    pub async fn stream_generation(
        &self,
        session_id: &str,
        user_id: &str,
        on_progress: Option<ProgressCallback>,
        on_message: Option<MessageCallback>,
    ) -> Result<GenerationOutcome> {
        self.stream_generation_with_cancel(
            session_id,
            user_id,
            on_progress,
            on_message,
            CancellationToken::new(),
        )
        .await
    }

    /// Starts the session, attaches the given observers and walks the
    /// script.
    ///
    /// Failures inside the script are written to the session as an `error`
    /// record plus an `error` message and reported as
    /// [`GenerationOutcome::Failed`]; only failing to start the session or to
    /// attach observers returns `Err`. The token is checked between phases.
    /// Observers attached here are released after the configured grace
    /// period, not when the script returns.
    pub async fn stream_generation_with_cancel(
        &self,
        session_id: &str,
        user_id: &str,
        on_progress: Option<ProgressCallback>,
        on_message: Option<MessageCallback>,
        cancel: CancellationToken,
    ) -> Result<GenerationOutcome> {
        self.start_generation_session(session_id, user_id).await?;

        let observers = self
            .attach_observers(session_id, on_progress, on_message)
            .await?;

        let outcome = match self.run_script(session_id, &cancel).await {
            Ok(Some(files)) => GenerationOutcome::Completed { files },
            Ok(None) => {
                tracing::info!(session_id = %session_id, "Generation cancelled");
                GenerationOutcome::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(write_err) = self.error_generation(session_id, &message).await {
                    tracing::error!(session_id = %session_id, error = %write_err, "Failed to record generation error");
                }
                if let Err(send_err) = self
                    .send_message(session_id, StreamMessage::error(message.clone()))
                    .await
                {
                    tracing::error!(session_id = %session_id, error = %send_err, "Failed to send error message");
                }
                GenerationOutcome::Failed { message }
            }
        };

        self.schedule_release(observers);
        Ok(outcome)
    }

    /// Subscribes the given callbacks. On failure, observers attached so far
    /// are released before the error is returned.
    async fn attach_observers(
        &self,
        session_id: &str,
        on_progress: Option<ProgressCallback>,
        on_message: Option<MessageCallback>,
    ) -> Result<Vec<Subscription>> {
        let mut observers = Vec::new();
        if let Some(callback) = on_progress {
            observers.push(
                self.subscribe_to_generation(session_id, move |session| callback(session))
                    .await?,
            );
        }
        if let Some(callback) = on_message {
            match self
                .subscribe_to_messages(session_id, move |message| callback(message))
                .await
            {
                Ok(subscription) => observers.push(subscription),
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to attach message observer");
                    self.release(&observers);
                    return Err(e);
                }
            }
        }
        Ok(observers)
    }

    /// Walks the phases. `Ok(None)` means the token fired.
    async fn run_script(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<GeneratedFile>>> {
        let script = &self.script;

        if !pause(cancel, script.phase_delay).await {
            return Ok(None);
        }

        self.enter_phase(session_id, script::ANALYZING).await?;
        if !pause(cancel, script.phase_delay).await {
            return Ok(None);
        }

        self.enter_phase(session_id, script::GENERATING).await?;
        if !pause(cancel, script.phase_delay).await {
            return Ok(None);
        }

        let mut produced = Vec::with_capacity(script.files.len());
        for (index, file) in script.files.iter().enumerate() {
            produced.push(file.clone());
            self.update_progress(
                session_id,
                GenerationStatus::Generating,
                GenerationScript::file_progress(index),
                &format!("Generated {}", file.name),
                Some(produced.clone()),
            )
            .await?;
            self.send_message(session_id, StreamMessage::file(file.clone()))
                .await?;
            if !pause(cancel, script.file_delay).await {
                return Ok(None);
            }
        }

        self.enter_phase(session_id, script::REVIEWING).await?;
        if !pause(cancel, script.phase_delay).await {
            return Ok(None);
        }

        self.complete_generation(session_id, produced.clone()).await?;
        self.send_message(session_id, StreamMessage::complete(produced.clone()))
            .await?;
        Ok(Some(produced))
    }

    async fn enter_phase(&self, session_id: &str, phase: Phase) -> Result<()> {
        tracing::info!(session_id = %session_id, status = %phase.status, progress = phase.progress, "Entering phase");
        self.update_progress(session_id, phase.status, phase.progress, phase.label, None)
            .await?;
        self.send_message(
            session_id,
            StreamMessage::progress(phase.status, phase.progress, phase.label),
        )
        .await
    }

    fn schedule_release(&self, observers: Vec<Subscription>) {
        if observers.is_empty() {
            return;
        }
        let tracker = self.tracker.clone();
        let grace = self.settings.teardown_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release_handles(&observers);
            for subscription in observers {
                subscription.unsubscribe();
            }
        });
    }
}

/// Sleeps for `delay` unless the token fires first. Returns `false` when
/// cancelled.
async fn pause(cancel: &CancellationToken, delay: std::time::Duration) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

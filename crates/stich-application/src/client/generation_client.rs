use std::sync::{Arc, Mutex, PoisonError, Weak};

use stich_core::error::Result;
use stich_core::generation::{GenerationSession, generate_session_id};
use stich_core::store::Subscription;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::state::GenerationState;
use crate::realtime::{GenerationOutcome, RealtimeService};

/// State shared with store listeners.
///
/// `epoch` changes whenever the client detaches, so dispatches that were
/// already in flight for an old attachment are dropped.
struct Shared {
    inner: Mutex<SharedInner>,
    updates: watch::Sender<GenerationState>,
    history_limit: Option<usize>,
}

struct SharedInner {
    state: GenerationState,
    epoch: u64,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the state and starts a new epoch.
    fn reset(&self, state: GenerationState) -> u64 {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.state = state;
        self.updates.send_replace(inner.state.clone());
        inner.epoch
    }

    /// Ends the current epoch and lets `f` adjust the state.
    fn detach(&self, f: impl FnOnce(&mut GenerationState)) {
        let mut inner = self.lock();
        inner.epoch += 1;
        f(&mut inner.state);
        self.updates.send_replace(inner.state.clone());
    }

    fn modify(&self, f: impl FnOnce(&mut GenerationState)) {
        let mut inner = self.lock();
        f(&mut inner.state);
        self.updates.send_replace(inner.state.clone());
    }

    /// Applies `f` only if `epoch` is still current.
    fn update(&self, epoch: u64, f: impl FnOnce(&mut GenerationState)) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        f(&mut inner.state);
        self.updates.send_replace(inner.state.clone());
    }

    fn fail(&self, epoch: u64, message: String) {
        self.update(epoch, |state| {
            state.is_generating = false;
            state.error = Some(message);
        });
    }
}

struct ActiveGeneration {
    session_id: String,
    subscriptions: Vec<Subscription>,
    /// Present only for runs this client started.
    cancel: Option<CancellationToken>,
}

/// Consumer-side view of one generation at a time.
///
/// Bridges the push feeds of a [`RealtimeService`] into a single
/// [`GenerationState`], and owns the subscriptions it opens. Observers read
/// the state through [`GenerationClient::state`] or [`GenerationClient::watch`].
pub struct GenerationClient {
    service: Arc<RealtimeService>,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveGeneration>>,
}

impl GenerationClient {
    pub fn new(service: Arc<RealtimeService>) -> Self {
        let history_limit = service.settings().message_history_limit;
        let (updates, _) = watch::channel(GenerationState::default());
        Self {
            service,
            shared: Arc::new(Shared {
                inner: Mutex::new(SharedInner {
                    state: GenerationState::default(),
                    epoch: 0,
                }),
                updates,
                history_limit,
            }),
            active: Mutex::new(None),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> GenerationState {
        self.shared.lock().state.clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<GenerationState> {
        self.shared.updates.subscribe()
    }

    /// Session currently observed, if any.
    pub fn session_id(&self) -> Option<String> {
        self.lock_active()
            .as_ref()
            .map(|active| active.session_id.clone())
    }

    /// Starts a new scripted generation for `user_id` and returns its id.
    ///
    /// The client subscribes to both feeds before the run starts. Failures
    /// are reported through `state().error`.
    pub async fn start_generation(&self, user_id: &str) -> String {
        self.stop_generation();

        let session_id = generate_session_id();
        let epoch = self.shared.reset(GenerationState::generating());

        let subscriptions = match self.attach(&session_id, epoch).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to subscribe to generation");
                self.shared.fail(epoch, e.to_string());
                return session_id;
            }
        };

        let cancel = CancellationToken::new();
        self.set_active(ActiveGeneration {
            session_id: session_id.clone(),
            subscriptions,
            cancel: Some(cancel.clone()),
        });

        let service = self.service.clone();
        let shared = Arc::downgrade(&self.shared);
        let run_session_id = session_id.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            let result = service
                .stream_generation_with_cancel(&run_session_id, &user_id, None, None, cancel)
                .await;
            match result {
                Ok(GenerationOutcome::Completed { files }) => {
                    tracing::debug!(session_id = %run_session_id, files = files.len(), "Run finished");
                }
                Ok(outcome) => {
                    tracing::debug!(session_id = %run_session_id, outcome = ?outcome, "Run finished");
                }
                Err(e) => {
                    if let Some(shared) = shared.upgrade() {
                        shared.fail(epoch, e.to_string());
                    }
                }
            }
        });

        session_id
    }

    /// Stops observing the current session.
    ///
    /// This is a soft unsubscribe: a run started by this client keeps going
    /// and keeps writing; the writes are just no longer reflected here.
    pub fn stop_generation(&self) {
        if let Some(active) = self.take_active() {
            tracing::debug!(session_id = %active.session_id, "Detaching from generation");
            self.service.release(&active.subscriptions);
        }
        self.shared.detach(|state| state.is_generating = false);
    }

    /// Stops observing and asks the run started by this client to halt at
    /// its next phase boundary.
    pub fn cancel_generation(&self) {
        let cancel = self
            .lock_active()
            .as_ref()
            .and_then(|active| active.cancel.clone());
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.stop_generation();
    }

    /// Resets the state. Subscriptions are left as they are; stop first.
    pub fn clear_generation(&self) {
        self.shared.modify(|state| *state = GenerationState::default());
    }

    /// Re-attaches to an existing session without restarting its run.
    ///
    /// For a session that already finished, the first delivered record
    /// flips `is_generating` back to false.
    pub async fn resume_generation(&self, session_id: &str) {
        self.stop_generation();
        let epoch = self.shared.reset(GenerationState::generating());

        match self.attach(session_id, epoch).await {
            Ok(subscriptions) => self.set_active(ActiveGeneration {
                session_id: session_id.to_string(),
                subscriptions,
                cancel: None,
            }),
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to resume generation");
                self.shared.fail(epoch, e.to_string());
            }
        }
    }

    /// One-shot read through the service.
    pub async fn get_generation_status(&self, session_id: &str) -> Result<Option<GenerationSession>> {
        self.service.get_generation_status(session_id).await
    }

    /// Consumer teardown without dropping the client: drops local
    /// subscriptions and disconnects every listener the service tracks.
    pub async fn shutdown(&self) {
        self.stop_generation();
        self.service.disconnect_all().await;
    }

    async fn attach(&self, session_id: &str, epoch: u64) -> Result<Vec<Subscription>> {
        let progress_target = Arc::downgrade(&self.shared);
        let progress = self
            .service
            .subscribe_to_generation(session_id, move |session| {
                with_shared(&progress_target, |shared| {
                    shared.update(epoch, |state| state.apply_progress(session));
                });
            })
            .await?;

        let message_target = Arc::downgrade(&self.shared);
        let messages = self
            .service
            .subscribe_to_messages(session_id, move |message| {
                with_shared(&message_target, |shared| {
                    let limit = shared.history_limit;
                    shared.update(epoch, |state| state.apply_message(message, limit));
                });
            })
            .await;

        match messages {
            Ok(messages) => Ok(vec![progress, messages]),
            Err(e) => {
                self.service.release(&[progress]);
                Err(e)
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveGeneration>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_active(&self, active: ActiveGeneration) {
        *self.lock_active() = Some(active);
    }

    fn take_active(&self) -> Option<ActiveGeneration> {
        self.lock_active().take()
    }
}

fn with_shared(target: &Weak<Shared>, f: impl FnOnce(&Shared)) {
    if let Some(shared) = target.upgrade() {
        f(&shared);
    }
}

/// Consumer teardown: the client's own handles plus every listener the
/// service still tracks.
impl Drop for GenerationClient {
    fn drop(&mut self) {
        if let Some(active) = self.take_active() {
            self.service.release(&active.subscriptions);
        }
        self.service.disconnect_tracked();
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Disposer for a store listener.
///
/// Clones share the same registration. Dropping a handle does not
/// unsubscribe; call [`Subscription::unsubscribe`] explicitly.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    id: u64,
    path: String,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
                path: path.into(),
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The store path this listener is attached to.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Stops the listener. No dispatch starts after this returns.
    /// Calling it more than once is harmless.
    pub fn unsubscribe(&self) {
        if !self.inner.token.is_cancelled() {
            tracing::debug!(id = self.inner.id, path = %self.inner.path, "Unsubscribing listener");
            self.inner.token.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.inner.token.is_cancelled()
    }

    /// Resolves once the subscription has been disposed. Store
    /// implementations select on this in their dispatch loops.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_is_shared_and_idempotent() {
        let subscription = Subscription::new("generations/gen_1");
        let clone = subscription.clone();
        assert!(clone.is_active());

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert!(!clone.is_active());
        assert_eq!(clone.id(), subscription.id());
        assert_eq!(clone.path(), "generations/gen_1");
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Subscription::new("a").id(), Subscription::new("a").id());
    }
}

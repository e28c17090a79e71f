use std::{fmt, rc::Weak, sync::Arc};

use crate::{ListenerId, listener::Location};

/// Removal side of the emitter, erased over payload and result types.
pub(crate) trait Detach {
    fn detach(&self, location: &Location, id: ListenerId) -> bool;
}

/// Handle returned by every registration.
///
/// [`off`](Self::off) removes exactly the registration that produced this
/// handle. It is idempotent: calling it again, after a once-listener already
/// fired, after the subtree was cleared, or after the emitter was dropped
/// is a no-op.
///
/// Dropping a `Subscription` does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    owner: Weak<dyn Detach>,
    id: ListenerId,
    location: Location,
    pattern: Arc<str>,
}

impl Subscription {
    pub(crate) fn new(
        owner: Weak<dyn Detach>,
        id: ListenerId,
        location: Location,
        pattern: Arc<str>,
    ) -> Self {
        Self {
            owner,
            id,
            location,
            pattern,
        }
    }

    /// Unsubscribe. Returns true if this call removed the listener.
    pub fn off(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|owner| owner.detach(&self.location, self.id))
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The full pattern this listener was registered under, scope prefix included.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Unsubscribes when dropped. Used by pending `wait_for` futures.
pub(crate) struct SubscriptionGuard(Subscription);

impl SubscriptionGuard {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self(subscription)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.off();
    }
}

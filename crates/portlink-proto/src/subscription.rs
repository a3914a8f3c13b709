//! Handler subscription guard.

use parking_lot::Mutex;

/// Handle for one registered handler.
///
/// Calling [`unsubscribe`](Self::unsubscribe) removes exactly the callback
/// this guard was returned for, leaving co-registered callbacks for the same
/// event untouched. It is idempotent: calling it again (or racing two calls)
/// is a no-op. Dropping the guard does **not** unsubscribe — a registration
/// outlives its handle and dies only by an explicit `unsubscribe` call.
pub struct Subscription {
    revoke: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new(revoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            revoke: Mutex::new(Some(Box::new(revoke))),
        }
    }

    /// Remove the registered callback. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let revoke = self.revoke.lock().take();
        if let Some(revoke) = revoke {
            revoke();
        }
    }

    /// Whether the registration is still in place.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.revoke.lock().is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

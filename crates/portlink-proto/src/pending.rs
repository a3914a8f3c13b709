//! Pending request correlation tables.

use std::collections::HashMap;
use std::hash::Hash;

use portlink_core::{CallId, RequestError};
use serde_json::Value;
use tokio::sync::oneshot;

/// Resolver half of one outstanding request.
pub(crate) type Settle = oneshot::Sender<Result<Value, RequestError>>;

/// Correlation key for one outstanding request within a scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PendingKey {
    /// Per-call mode: matched by the `callId` echoed on the reply.
    Call(CallId),
    /// Compatibility mode: matched by the base event name; at most one
    /// live slot per (scope, name).
    Name(String),
}

/// Outstanding request resolvers, scoped per connection.
///
/// The client node uses the unit scope (one implicit connection); the hub
/// scopes by `PortId`, which keeps replies from one port from settling a
/// call made on another.
pub(crate) struct PendingTable<S> {
    slots: HashMap<S, HashMap<PendingKey, Settle>>,
}

impl<S: Eq + Hash + Clone> PendingTable<S> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Register a resolver, returning the one it replaced (compatibility
    /// mode supersede).
    pub fn insert(&mut self, scope: S, key: PendingKey, tx: Settle) -> Option<Settle> {
        self.slots.entry(scope).or_default().insert(key, tx)
    }

    /// Remove and return the resolver for `key` within `scope`.
    pub fn remove(&mut self, scope: &S, key: &PendingKey) -> Option<Settle> {
        let bucket = self.slots.get_mut(scope)?;
        let tx = bucket.remove(key);
        if bucket.is_empty() {
            let _ = self.slots.remove(scope);
        }
        tx
    }

    /// Remove every resolver registered under `scope`.
    pub fn remove_scope(&mut self, scope: &S) -> Vec<Settle> {
        self.slots
            .remove(scope)
            .map(|bucket| bucket.into_values().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.values().map(HashMap::len).sum()
    }
}

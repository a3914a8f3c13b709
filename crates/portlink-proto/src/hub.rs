//! Primary-side protocol node.
//!
//! A [`PortHub`] addresses many independent connections by [`PortId`]. Ports
//! come into existence implicitly, the first time the transport adapter
//! reports an envelope tagged with a new identifier, and are torn down by an
//! explicit [`close_port`](PortHub::close_port) call from the host when the
//! owning connection ends. Handlers register either against one port or
//! against a wildcard bucket invoked for every port; the two buckets are
//! independent and both fire on a matching envelope.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use portlink_core::{
    base_name, CallId, Envelope, PortId, RequestError, SendError, ERROR_SUFFIX,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::{CorrelationMode, ProtocolConfig};
use crate::handlers::PortRequestHandler;
use crate::pending::{PendingKey, PendingTable};
use crate::replay::ReplayQueue;
use crate::subscription::Subscription;
use crate::transport::{PortTransport, TaggedEnvelope};

type PortEventCallback = Arc<dyn Fn(PortId, Value) + Send + Sync>;

/// One registered handler for an event name.
#[derive(Clone)]
enum Entry {
    Event(PortEventCallback),
    Request(Arc<dyn PortRequestHandler>),
}

/// Which bucket a registration lives in.
enum Bucket {
    Wildcard,
    Port(PortId),
}

struct HubState {
    transport: Option<Arc<dyn PortTransport>>,
    wildcard: HashMap<String, HashMap<u64, Entry>>,
    scoped: HashMap<PortId, HashMap<String, HashMap<u64, Entry>>>,
    pending: PendingTable<PortId>,
    replay: ReplayQueue<TaggedEnvelope>,
    ports: HashSet<PortId>,
    next_token: u64,
}

struct HubInner {
    config: ProtocolConfig,
    state: Mutex<HubState>,
}

/// Primary-mode protocol node: N connections addressed by [`PortId`].
///
/// Cloning is cheap and clones share all registries. The adapter binds the
/// outbound half via [`bind`](Self::bind) and pushes every inbound envelope
/// through [`deliver`](Self::deliver) with the identifier of the connection
/// it arrived on. Ordering is guaranteed per connection only.
#[derive(Clone)]
pub struct PortHub {
    inner: Arc<HubInner>,
}

impl PortHub {
    /// Create a hub with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    /// Create a hub with an explicit configuration.
    #[must_use]
    pub fn with_config(config: ProtocolConfig) -> Self {
        let replay = ReplayQueue::new(config.replay_capacity);
        Self {
            inner: Arc::new(HubInner {
                config,
                state: Mutex::new(HubState {
                    transport: None,
                    wildcard: HashMap::new(),
                    scoped: HashMap::new(),
                    pending: PendingTable::new(),
                    replay,
                    ports: HashSet::new(),
                    next_token: 0,
                }),
            }),
        }
    }

    /// Wire the outbound half. Rebinding replaces the previous transport.
    pub fn bind(&self, transport: impl PortTransport + 'static) {
        self.inner.state.lock().transport = Some(Arc::new(transport));
    }

    /// Whether a transport is currently bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().transport.is_some()
    }

    /// Named fire-and-forget accessor.
    #[must_use]
    pub fn event(&self, name: impl Into<String>) -> PortEvent {
        PortEvent {
            inner: Arc::clone(&self.inner),
            name: name.into(),
        }
    }

    /// Named request/response accessor.
    #[must_use]
    pub fn rpc(&self, name: impl Into<String>) -> PortRpc {
        PortRpc {
            inner: Arc::clone(&self.inner),
            name: name.into(),
        }
    }

    /// Feed one inbound envelope into the hub.
    ///
    /// An unknown `port_id` implicitly creates the port. Replies settle the
    /// outstanding request they correlate with and stop; everything else is
    /// broadcast to the wildcard and port-scoped handlers for its type, or
    /// buffered when neither has a registration yet. Handlers run outside
    /// the hub's state lock; request handlers additionally require a tokio
    /// runtime, since their replies are produced on a spawned task.
    pub fn deliver(&self, port_id: PortId, envelope: Envelope) {
        if self.inner.state.lock().ports.insert(port_id.clone()) {
            debug!(port = %port_id, "port connected");
        }
        if base_name(&envelope.event_type).is_some() {
            self.inner.settle_reply(&port_id, envelope);
        } else {
            self.inner.dispatch(port_id, envelope);
        }
    }

    /// Release every piece of per-port bookkeeping for `port`.
    ///
    /// Port-scoped handlers stop firing, envelopes queued from the port are
    /// discarded, and outstanding requests to it settle with
    /// [`RequestError::PortClosed`]. Wildcard registrations and other ports
    /// are untouched. Idempotent; the port reappears if the adapter reports
    /// traffic for it again.
    pub fn close_port(&self, port: &PortId) {
        let (settles, existed) = {
            let mut state = self.inner.state.lock();
            let existed = state.ports.remove(port);
            let _ = state.scoped.remove(port);
            state.replay.retain(|tagged| tagged.port_id != *port);
            (state.pending.remove_scope(port), existed)
        };
        if existed {
            debug!(port = %port, outstanding = settles.len(), "port closed");
        }
        for settle in settles {
            let _ = settle.send(Err(RequestError::PortClosed));
        }
    }

    /// Ports the hub has seen traffic from and not yet closed.
    #[must_use]
    pub fn ports(&self) -> Vec<PortId> {
        self.inner.state.lock().ports.iter().cloned().collect()
    }

    /// Number of live ports.
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.inner.state.lock().ports.len()
    }
}

impl Default for PortHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PortHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PortHub")
            .field("bound", &state.transport.is_some())
            .field("ports", &state.ports.len())
            .finish()
    }
}

impl HubInner {
    fn send_to(&self, port: &PortId, envelope: Envelope) -> Result<(), SendError> {
        let transport = self
            .state
            .lock()
            .transport
            .clone()
            .ok_or(SendError::NotBound)?;
        debug!(port = %port, event = %envelope.event_type, "sending envelope");
        transport.send(port, envelope)?;
        Ok(())
    }

    /// Settle the outstanding request matching a reply from `port`. Slots
    /// are scoped per port, so a reply from one connection can never settle
    /// a call made on another. Stray replies are dropped, never buffered.
    fn settle_reply(&self, port: &PortId, envelope: Envelope) {
        let Some(base) = base_name(&envelope.event_type) else {
            return;
        };
        let settle = {
            let mut state = self.state.lock();
            let by_call = envelope
                .call_id
                .as_ref()
                .and_then(|id| state.pending.remove(port, &PendingKey::Call(id.clone())));
            by_call.or_else(|| state.pending.remove(port, &PendingKey::Name(base.to_owned())))
        };
        let Some(settle) = settle else {
            warn!(port = %port, event = %envelope.event_type, "dropping reply with no outstanding request");
            return;
        };
        let outcome = if envelope.event_type.ends_with(ERROR_SUFFIX) {
            Err(RequestError::Remote {
                message: envelope.failure_message(),
            })
        } else {
            Ok(envelope.data)
        };
        let _ = settle.send(outcome);
    }

    fn dispatch(self: &Arc<Self>, port_id: PortId, envelope: Envelope) {
        let entries: Vec<Entry> = {
            let mut state = self.state.lock();
            let mut snapshot: Vec<Entry> = state
                .wildcard
                .get(&envelope.event_type)
                .map(|set| set.values().cloned().collect())
                .unwrap_or_default();
            if let Some(set) = state
                .scoped
                .get(&port_id)
                .and_then(|names| names.get(&envelope.event_type))
            {
                snapshot.extend(set.values().cloned());
            }
            if snapshot.is_empty() {
                let name = envelope.event_type.clone();
                let tagged = TaggedEnvelope {
                    port_id: port_id.clone(),
                    payload: envelope,
                };
                if state.replay.push(&name, tagged) {
                    debug!(port = %port_id, event = %name, "no handler yet; envelope queued");
                } else {
                    warn!(port = %port_id, event = %name, "replay queue full; envelope dropped");
                }
                return;
            }
            snapshot
        };
        for entry in entries {
            self.invoke(&port_id, &envelope, entry);
        }
    }

    fn invoke(self: &Arc<Self>, port_id: &PortId, envelope: &Envelope, entry: Entry) {
        match entry {
            Entry::Event(callback) => callback(port_id.clone(), envelope.data.clone()),
            Entry::Request(handler) => self.spawn_reply(port_id.clone(), envelope.clone(), handler),
        }
    }

    /// Run a request handler and route its reply back to the originating
    /// port.
    fn spawn_reply(
        self: &Arc<Self>,
        port_id: PortId,
        envelope: Envelope,
        handler: Arc<dyn PortRequestHandler>,
    ) {
        let inner = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let Envelope {
                event_type: name,
                data,
                call_id,
            } = envelope;
            let reply = match handler.handle(port_id.clone(), data).await {
                Ok(Some(value)) => Envelope::response(&name, call_id, value),
                Ok(None) => {
                    debug!(port = %port_id, event = %name, "request handler produced no reply");
                    return;
                }
                Err(failure) => Envelope::failure(&name, call_id, failure.message),
            };
            if let Err(err) = inner.send_to(&port_id, reply) {
                warn!(port = %port_id, event = %name, error = %err, "failed to send reply");
            }
        });
    }

    /// Register one handler entry into `bucket`, first flushing anything
    /// queued for the name in that bucket's scope. The flush loops until the
    /// queue is observed empty under the lock, so a live envelope can never
    /// overtake a queued one.
    fn register(self: &Arc<Self>, name: &str, bucket: Bucket, entry: Entry) -> Subscription {
        let token;
        loop {
            let queued = {
                let mut state = self.state.lock();
                let queued = match &bucket {
                    Bucket::Wildcard => state.replay.take(name).into_iter().collect::<Vec<_>>(),
                    Bucket::Port(port) => state
                        .replay
                        .take_matching(name, |tagged| tagged.port_id == *port),
                };
                if queued.is_empty() {
                    token = state.next_token;
                    state.next_token += 1;
                    let set = match &bucket {
                        Bucket::Wildcard => state.wildcard.entry(name.to_owned()).or_default(),
                        Bucket::Port(port) => state
                            .scoped
                            .entry(port.clone())
                            .or_default()
                            .entry(name.to_owned())
                            .or_default(),
                    };
                    let _ = set.insert(token, entry.clone());
                    break;
                }
                queued
            };
            debug!(event = %name, count = queued.len(), "flushing queued envelopes");
            for tagged in queued {
                self.invoke(&tagged.port_id, &tagged.payload, entry.clone());
            }
        }

        let weak = Arc::downgrade(self);
        let name = name.to_owned();
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            match &bucket {
                Bucket::Wildcard => {
                    if let Some(set) = state.wildcard.get_mut(&name) {
                        let _ = set.remove(&token);
                        if set.is_empty() {
                            let _ = state.wildcard.remove(&name);
                        }
                    }
                }
                Bucket::Port(port) => {
                    if let Some(names) = state.scoped.get_mut(port) {
                        if let Some(set) = names.get_mut(&name) {
                            let _ = set.remove(&token);
                            if set.is_empty() {
                                let _ = names.remove(&name);
                            }
                        }
                        if names.is_empty() {
                            let _ = state.scoped.remove(port);
                        }
                    }
                }
            }
        })
    }

    /// Register a resolver for one outgoing request to `port`, returning the
    /// envelope to send, the key to clean up on send failure, and the
    /// settlement receiver. Fails fast when no transport is bound.
    fn register_pending(
        &self,
        port: &PortId,
        name: &str,
        payload: Value,
    ) -> Result<(Envelope, PendingKey, PendingRx), RequestError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if state.transport.is_none() {
            return Err(RequestError::NotBound);
        }
        let (envelope, key) = match self.config.correlation {
            CorrelationMode::PerCall => {
                let id = CallId::new();
                let key = PendingKey::Call(id.clone());
                let _ = state.pending.insert(port.clone(), key.clone(), tx);
                (Envelope::request(name, Some(id), payload), key)
            }
            CorrelationMode::NameSlot => {
                let key = PendingKey::Name(name.to_owned());
                if let Some(old) = state.pending.insert(port.clone(), key.clone(), tx) {
                    warn!(port = %port, event = %name, "concurrent request superseded an outstanding call");
                    let _ = old.send(Err(RequestError::Superseded));
                }
                (Envelope::request(name, None, payload), key)
            }
        };
        Ok((envelope, key, rx))
    }
}

type PendingRx = oneshot::Receiver<Result<Value, RequestError>>;

/// Named fire-and-forget accessor for one hub.
#[derive(Clone)]
pub struct PortEvent {
    inner: Arc<HubInner>,
    name: String,
}

impl PortEvent {
    /// The event's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one payload to exactly the given port.
    pub fn send(&self, port: &PortId, payload: Value) -> Result<(), SendError> {
        self.inner.send_to(port, Envelope::event(&self.name, payload))
    }

    /// Register a wildcard callback, invoked for this event from every port.
    ///
    /// Everything queued for the name, from any port, is flushed to the
    /// callback first, in arrival order.
    pub fn handle(
        &self,
        callback: impl Fn(PortId, Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner
            .register(&self.name, Bucket::Wildcard, Entry::Event(Arc::new(callback)))
    }

    /// Register a callback scoped to one port; envelopes from other ports
    /// never reach it. Only the port's own queued envelopes are flushed.
    pub fn handle_port(
        &self,
        port: &PortId,
        callback: impl Fn(PortId, Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.register(
            &self.name,
            Bucket::Port(port.clone()),
            Entry::Event(Arc::new(callback)),
        )
    }
}

/// Named request/response accessor for one hub.
#[derive(Clone)]
pub struct PortRpc {
    inner: Arc<HubInner>,
    name: String,
}

impl PortRpc {
    /// The request's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request to the given port and await its settlement.
    ///
    /// Resolves when the port replies `:response`, fails with
    /// [`RequestError::Remote`] when its handler failed, and fails with
    /// [`RequestError::PortClosed`] when the port is closed while the call
    /// is outstanding. There is no built-in timeout.
    pub async fn request(&self, port: &PortId, payload: Value) -> Result<Value, RequestError> {
        let (envelope, key, rx) = self.inner.register_pending(port, &self.name, payload)?;
        if let Err(err) = self.inner.send_to(port, envelope) {
            let _ = self.inner.state.lock().pending.remove(port, &key);
            return Err(err.into());
        }
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RequestError::PortClosed),
        }
    }

    /// Register the wildcard responder for this request name. The handler
    /// receives the originating port and its reply is routed back there.
    pub fn handle(&self, handler: impl PortRequestHandler + 'static) -> Subscription {
        self.inner
            .register(&self.name, Bucket::Wildcard, Entry::Request(Arc::new(handler)))
    }

    /// Register a responder scoped to one port.
    pub fn handle_port(
        &self,
        port: &PortId,
        handler: impl PortRequestHandler + 'static,
    ) -> Subscription {
        self.inner.register(
            &self.name,
            Bucket::Port(port.clone()),
            Entry::Request(Arc::new(handler)),
        )
    }
}

//! Client-side protocol node.
//!
//! A [`ClientNode`] owns the client half of one implicit connection to the
//! primary side. Named accessors come in two flavors: [`ClientEvent`] for
//! fire-and-forget traffic and [`ClientRpc`] for request/response traffic.
//! Envelopes that arrive before any handler is registered for their type are
//! buffered and flushed, in arrival order, to the first registration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use portlink_core::{
    base_name, CallId, Envelope, RequestError, SendError, ERROR_SUFFIX,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::{CorrelationMode, ProtocolConfig};
use crate::handlers::RequestHandler;
use crate::pending::{PendingKey, PendingTable};
use crate::replay::ReplayQueue;
use crate::subscription::Subscription;
use crate::transport::ClientTransport;

type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// One registered handler for an event name.
#[derive(Clone)]
enum Entry {
    Event(EventCallback),
    Request(Arc<dyn RequestHandler>),
}

struct ClientState {
    transport: Option<Arc<dyn ClientTransport>>,
    handlers: HashMap<String, HashMap<u64, Entry>>,
    pending: PendingTable<()>,
    replay: ReplayQueue<Envelope>,
    next_token: u64,
}

struct ClientInner {
    config: ProtocolConfig,
    state: Mutex<ClientState>,
}

/// Client-mode protocol node: one implicit connection to the primary side.
///
/// Cloning is cheap and clones share all registries. The node never
/// establishes the channel itself; an adapter binds the outbound half via
/// [`bind`](Self::bind) and pushes every inbound envelope through
/// [`deliver`](Self::deliver), preserving arrival order.
#[derive(Clone)]
pub struct ClientNode {
    inner: Arc<ClientInner>,
}

impl ClientNode {
    /// Create a node with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    /// Create a node with an explicit configuration.
    #[must_use]
    pub fn with_config(config: ProtocolConfig) -> Self {
        let replay = ReplayQueue::new(config.replay_capacity);
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Mutex::new(ClientState {
                    transport: None,
                    handlers: HashMap::new(),
                    pending: PendingTable::new(),
                    replay,
                    next_token: 0,
                }),
            }),
        }
    }

    /// Wire the outbound half of the connection. Rebinding replaces the
    /// previous transport.
    pub fn bind(&self, transport: impl ClientTransport + 'static) {
        self.inner.state.lock().transport = Some(Arc::new(transport));
    }

    /// Whether a transport is currently bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().transport.is_some()
    }

    /// Named fire-and-forget accessor.
    #[must_use]
    pub fn event(&self, name: impl Into<String>) -> ClientEvent {
        ClientEvent {
            inner: Arc::clone(&self.inner),
            name: name.into(),
        }
    }

    /// Named request/response accessor.
    #[must_use]
    pub fn rpc(&self, name: impl Into<String>) -> ClientRpc {
        ClientRpc {
            inner: Arc::clone(&self.inner),
            name: name.into(),
        }
    }

    /// Feed one inbound envelope into the node.
    ///
    /// Replies settle their outstanding request and stop; everything else is
    /// broadcast to the handlers registered for its type, or buffered when
    /// none exist yet. Handlers run outside the node's state lock; request
    /// handlers additionally require a tokio runtime, since their replies are
    /// produced on a spawned task.
    pub fn deliver(&self, envelope: Envelope) {
        if base_name(&envelope.event_type).is_some() {
            self.inner.settle_reply(envelope);
        } else {
            self.inner.dispatch(envelope);
        }
    }
}

impl Default for ClientNode {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ClientNode")
            .field("bound", &state.transport.is_some())
            .field("handler_names", &state.handlers.len())
            .finish()
    }
}

impl ClientInner {
    fn send_envelope(&self, envelope: Envelope) -> Result<(), SendError> {
        let transport = self
            .state
            .lock()
            .transport
            .clone()
            .ok_or(SendError::NotBound)?;
        debug!(event = %envelope.event_type, "sending envelope");
        transport.send(envelope)?;
        Ok(())
    }

    /// Settle the outstanding request matching a `:response` / `:error`
    /// envelope. Correlated replies match by `callId`; uncorrelated replies
    /// fall back to the name-keyed slot, so mixed-mode peers interoperate.
    /// Replies are never buffered: one with no outstanding request is dropped.
    fn settle_reply(&self, envelope: Envelope) {
        let Some(base) = base_name(&envelope.event_type) else {
            return;
        };
        let settle = {
            let mut state = self.state.lock();
            let by_call = envelope
                .call_id
                .as_ref()
                .and_then(|id| state.pending.remove(&(), &PendingKey::Call(id.clone())));
            by_call.or_else(|| state.pending.remove(&(), &PendingKey::Name(base.to_owned())))
        };
        let Some(settle) = settle else {
            warn!(event = %envelope.event_type, "dropping reply with no outstanding request");
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

    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        let entries: Vec<Entry> = {
            let mut state = self.state.lock();
            let snapshot: Vec<Entry> = state
                .handlers
                .get(&envelope.event_type)
                .map(|set| set.values().cloned().collect())
                .unwrap_or_default();
            if snapshot.is_empty() {
                let name = envelope.event_type.clone();
                if state.replay.push(&name, envelope) {
                    debug!(event = %name, "no handler yet; envelope queued");
                } else {
                    warn!(event = %name, "replay queue full; envelope dropped");
                }
                return;
            }
            snapshot
        };
        for entry in entries {
            self.invoke(&envelope, entry);
        }
    }

    fn invoke(self: &Arc<Self>, envelope: &Envelope, entry: Entry) {
        match entry {
            Entry::Event(callback) => callback(envelope.data.clone()),
            Entry::Request(handler) => self.spawn_reply(envelope.clone(), handler),
        }
    }

    /// Run a request handler and route its reply back over the transport.
    fn spawn_reply(self: &Arc<Self>, envelope: Envelope, handler: Arc<dyn RequestHandler>) {
        let inner = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let Envelope {
                event_type: name,
                data,
                call_id,
            } = envelope;
            let reply = match handler.handle(data).await {
                Ok(Some(value)) => Envelope::response(&name, call_id, value),
                Ok(None) => {
                    // The caller's request stays pending; this mirrors the
                    // wire protocol, which sends nothing for a void result.
                    debug!(event = %name, "request handler produced no reply");
                    return;
                }
                Err(failure) => Envelope::failure(&name, call_id, failure.message),
            };
            if let Err(err) = inner.send_envelope(reply) {
                warn!(event = %name, error = %err, "failed to send reply");
            }
        });
    }

    /// Register one handler entry, first flushing anything queued for the
    /// name. The flush loops until the queue is observed empty under the
    /// lock, so a live envelope can never overtake a queued one.
    fn register(self: &Arc<Self>, name: &str, entry: Entry) -> Subscription {
        let token;
        loop {
            let queued = {
                let mut state = self.state.lock();
                let queued = state.replay.take(name);
                if queued.is_empty() {
                    token = state.next_token;
                    state.next_token += 1;
                    let _ = state
                        .handlers
                        .entry(name.to_owned())
                        .or_default()
                        .insert(token, entry.clone());
                    break;
                }
                queued
            };
            debug!(event = %name, count = queued.len(), "flushing queued envelopes");
            for envelope in queued {
                self.invoke(&envelope, entry.clone());
            }
        }

        let weak = Arc::downgrade(self);
        let name = name.to_owned();
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if let Some(set) = state.handlers.get_mut(&name) {
                let _ = set.remove(&token);
                if set.is_empty() {
                    let _ = state.handlers.remove(&name);
                }
            }
        })
    }

    /// Register a resolver for one outgoing request, returning the envelope
    /// to send, the key to clean up on send failure, and the settlement
    /// receiver. Fails fast when no transport is bound.
    fn register_pending(
        &self,
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
                let _ = state.pending.insert((), key.clone(), tx);
                (Envelope::request(name, Some(id), payload), key)
            }
            CorrelationMode::NameSlot => {
                let key = PendingKey::Name(name.to_owned());
                if let Some(old) = state.pending.insert((), key.clone(), tx) {
                    warn!(event = %name, "concurrent request superseded an outstanding call");
                    let _ = old.send(Err(RequestError::Superseded));
                }
                (Envelope::request(name, None, payload), key)
            }
        };
        Ok((envelope, key, rx))
    }
}

type PendingRx = oneshot::Receiver<Result<Value, RequestError>>;

/// Named fire-and-forget accessor for one client node.
#[derive(Clone)]
pub struct ClientEvent {
    inner: Arc<ClientInner>,
    name: String,
}

impl ClientEvent {
    /// The event's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one payload to the primary side.
    pub fn send(&self, payload: Value) -> Result<(), SendError> {
        self.inner
            .send_envelope(Envelope::event(&self.name, payload))
    }

    /// Register a callback for this event.
    ///
    /// Anything queued for the name is flushed to the callback first, in
    /// arrival order; the callback then receives live envelopes until the
    /// returned [`Subscription`] is unsubscribed. Co-registered callbacks
    /// each receive every envelope.
    pub fn handle(&self, callback: impl Fn(Value) + Send + Sync + 'static) -> Subscription {
        self.inner
            .register(&self.name, Entry::Event(Arc::new(callback)))
    }
}

/// Named request/response accessor for one client node.
#[derive(Clone)]
pub struct ClientRpc {
    inner: Arc<ClientInner>,
    name: String,
}

impl ClientRpc {
    /// The request's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request and await its settlement.
    ///
    /// Resolves when a `:response` envelope arrives, or fails with
    /// [`RequestError::Remote`] when the peer's handler failed. There is no
    /// built-in timeout: a peer that never answers leaves the future pending
    /// forever, so callers needing a bound wrap this in their own.
    pub async fn request(&self, payload: Value) -> Result<Value, RequestError> {
        let (envelope, key, rx) = self.inner.register_pending(&self.name, payload)?;
        if let Err(err) = self.inner.send_envelope(envelope) {
            let _ = self.inner.state.lock().pending.remove(&(), &key);
            return Err(err.into());
        }
        match rx.await {
            Ok(outcome) => outcome,
            // The resolver was dropped without settling, which only happens
            // when the node itself is torn down.
            Err(_) => Err(RequestError::PortClosed),
        }
    }

    /// Register the responder for this request name.
    ///
    /// `Ok(Some(value))` replies `:response`, `Err` replies `:error` with
    /// the failure's message, and `Ok(None)` sends nothing at all, leaving
    /// the caller pending. Closures adapt via
    /// [`RequestFn`](crate::handlers::RequestFn).
    pub fn handle(&self, handler: impl RequestHandler + 'static) -> Subscription {
        self.inner
            .register(&self.name, Entry::Request(Arc::new(handler)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::RequestFn;
    use portlink_core::TransportError;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Transport that records every envelope it is asked to send.
    #[derive(Clone, Default)]
    struct Recording {
        sent: Arc<StdMutex<Vec<Envelope>>>,
    }

    impl Recording {
        fn sent(&self) -> Vec<Envelope> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ClientTransport for Recording {
        fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    fn collected() -> (Arc<StdMutex<Vec<Value>>>, impl Fn(Value) + Send + Sync) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value| sink.lock().unwrap().push(value))
    }

    #[test]
    fn send_before_bind_is_not_bound() {
        let node = ClientNode::new();
        let err = node.event("ping").send(json!(1)).unwrap_err();
        assert!(matches!(err, SendError::NotBound));
    }

    #[test]
    fn send_wraps_payload_in_envelope() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        node.event("theme.changed")
            .send(json!({"dark": true}))
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, "theme.changed");
        assert_eq!(sent[0].data["dark"], true);
        assert!(sent[0].call_id.is_none());
    }

    #[test]
    fn queued_envelopes_flush_in_arrival_order() {
        let node = ClientNode::new();
        for n in 1..=3 {
            node.deliver(Envelope::event("ping", json!(n)));
        }

        let (seen, sink) = collected();
        let _sub = node.event("ping").handle(sink);

        node.deliver(Envelope::event("ping", json!(4)));
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn flushed_envelopes_are_not_replayed_to_later_handlers() {
        let node = ClientNode::new();
        node.deliver(Envelope::event("ping", json!(1)));

        let (first, sink1) = collected();
        let _sub1 = node.event("ping").handle(sink1);
        let (second, sink2) = collected();
        let _sub2 = node.event("ping").handle(sink2);

        assert_eq!(first.lock().unwrap().len(), 1);
        assert!(second.lock().unwrap().is_empty());
    }

    #[test]
    fn broadcast_reaches_every_registered_callback() {
        let node = ClientNode::new();
        let (a, sink_a) = collected();
        let (b, sink_b) = collected();
        let _sub_a = node.event("tick").handle(sink_a);
        let _sub_b = node.event("tick").handle(sink_b);

        node.deliver(Envelope::event("tick", json!("now")));

        assert_eq!(a.lock().unwrap().len(), 1);
        assert_eq!(b.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let node = ClientNode::new();
        let (a, sink_a) = collected();
        let (b, sink_b) = collected();
        let sub_a = node.event("tick").handle(sink_a);
        let _sub_b = node.event("tick").handle(sink_b);

        sub_a.unsubscribe();
        sub_a.unsubscribe();
        node.deliver(Envelope::event("tick", json!(1)));

        assert!(a.lock().unwrap().is_empty());
        assert_eq!(b.lock().unwrap().len(), 1);
    }

    #[test]
    fn names_are_dispatched_independently() {
        let node = ClientNode::new();
        let (a, sink_a) = collected();
        let _sub = node.event("a").handle(sink_a);

        node.deliver(Envelope::event("b", json!(1)));
        assert!(a.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn request_resolves_on_response_envelope() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        let rpc = node.rpc("echo");
        let pending = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request(json!({"n": 5})).await }
        });
        tokio::task::yield_now().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, "echo");
        let call_id = sent[0].call_id.clone();
        assert!(call_id.is_some(), "per-call mode mints a callId");

        node.deliver(Envelope::response("echo", call_id, json!(10)));
        assert_eq!(pending.await.unwrap().unwrap(), json!(10));
    }

    #[tokio::test]
    async fn request_rejects_on_error_envelope() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        let rpc = node.rpc("echo");
        let pending = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request(json!(null)).await }
        });
        tokio::task::yield_now().await;

        let call_id = transport.sent()[0].call_id.clone();
        node.deliver(Envelope::failure("echo", call_id, "boom"));

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, RequestError::Remote { ref message } if message == "boom"));
    }

    #[tokio::test]
    async fn request_before_bind_is_not_bound() {
        let node = ClientNode::new();
        let err = node.rpc("echo").request(json!(null)).await.unwrap_err();
        assert!(matches!(err, RequestError::NotBound));
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently_in_per_call_mode() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        let rpc = node.rpc("echo");
        let first = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request(json!(1)).await }
        });
        let second = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request(json!(2)).await }
        });
        tokio::task::yield_now().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        // Answer in reverse order; correlation keeps the results straight.
        node.deliver(Envelope::response("echo", sent[1].call_id.clone(), json!("second")));
        node.deliver(Envelope::response("echo", sent[0].call_id.clone(), json!("first")));

        assert_eq!(first.await.unwrap().unwrap(), json!("first"));
        assert_eq!(second.await.unwrap().unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn name_slot_mode_supersedes_the_first_caller() {
        let node = ClientNode::with_config(ProtocolConfig::compat());
        let transport = Recording::default();
        node.bind(transport.clone());

        let rpc = node.rpc("echo");
        let first = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request(json!(1)).await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request(json!(2)).await }
        });
        tokio::task::yield_now().await;

        assert!(transport.sent().iter().all(|e| e.call_id.is_none()));
        assert!(matches!(
            first.await.unwrap().unwrap_err(),
            RequestError::Superseded
        ));

        node.deliver(Envelope::response("echo", None, json!("late")));
        assert_eq!(second.await.unwrap().unwrap(), json!("late"));
    }

    #[tokio::test]
    async fn request_handler_reply_round_trips() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        let _sub = node.rpc("echo").handle(RequestFn(|payload: Value| async move {
            let n = payload["n"].as_i64().unwrap_or(0);
            Ok(Some(json!(n * 2)))
        }));

        node.deliver(Envelope::request("echo", Some(CallId::from("c1")), json!({"n": 5})));
        tokio::task::yield_now().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, "echo:response");
        assert_eq!(sent[0].data, json!(10));
        assert_eq!(sent[0].call_id, Some(CallId::from("c1")));
    }

    #[tokio::test]
    async fn failing_handler_replies_with_error_envelope() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        let _sub = node
            .rpc("echo")
            .handle(RequestFn(|_: Value| async move {
                Err(portlink_core::HandlerFailure::new("boom"))
            }));

        node.deliver(Envelope::request("echo", None, json!(null)));
        tokio::task::yield_now().await;

        let sent = transport.sent();
        assert_eq!(sent[0].event_type, "echo:error");
        assert_eq!(sent[0].data, json!("boom"));
    }

    #[tokio::test]
    async fn void_handler_sends_no_reply() {
        let node = ClientNode::new();
        let transport = Recording::default();
        node.bind(transport.clone());

        let _sub = node
            .rpc("fire")
            .handle(RequestFn(|_: Value| async move { Ok(None) }));

        node.deliver(Envelope::request("fire", None, json!(null)));
        tokio::task::yield_now().await;

        assert!(transport.sent().is_empty());
    }

    #[test]
    fn stray_reply_is_dropped_not_queued() {
        let node = ClientNode::new();
        node.deliver(Envelope::response("echo", None, json!(1)));

        // A handler registered afterwards must not see the stray reply.
        let (seen, sink) = collected();
        let _sub = node.event("echo:response").handle(sink);
        assert!(seen.lock().unwrap().is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any sequence of payloads queued before registration is
            /// delivered exactly once, in arrival order, and never replayed.
            #[test]
            fn queued_payloads_deliver_once_in_order(
                payloads in proptest::collection::vec(any::<i64>(), 0..64)
            ) {
                let node = ClientNode::new();
                for payload in &payloads {
                    node.deliver(Envelope::event("ping", json!(payload)));
                }

                let (seen, sink) = collected();
                let _sub = node.event("ping").handle(sink);
                let expected: Vec<Value> = payloads.iter().map(|p| json!(p)).collect();
                prop_assert_eq!(&*seen.lock().unwrap(), &expected);

                let (replayed, sink2) = collected();
                let _sub2 = node.event("ping").handle(sink2);
                prop_assert!(replayed.lock().unwrap().is_empty());
            }
        }
    }
}

//! Handler traits for request/response events.

use async_trait::async_trait;
use portlink_core::{HandlerFailure, PortId};
use serde_json::Value;

/// Client-side request handler.
///
/// Return `Ok(Some(value))` to reply with a `:response` envelope, `Err` to
/// reply with an `:error` envelope carrying the failure's message, or
/// `Ok(None)` to send nothing at all — the caller's request then never
/// settles, a gap carried over from the wire protocol.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the reply for one request payload.
    async fn handle(&self, payload: Value) -> Result<Option<Value>, HandlerFailure>;
}

/// Primary-side request handler; receives the originating port.
#[async_trait]
pub trait PortRequestHandler: Send + Sync {
    /// Produce the reply for one request payload arriving from `port`.
    async fn handle(&self, port: PortId, payload: Value) -> Result<Option<Value>, HandlerFailure>;
}

/// Adapter turning an async closure into a [`RequestHandler`].
pub struct RequestFn<F>(pub F);

#[async_trait]
impl<F, Fut> RequestHandler for RequestFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, HandlerFailure>> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> Result<Option<Value>, HandlerFailure> {
        (self.0)(payload).await
    }
}

/// Adapter turning an async closure into a [`PortRequestHandler`].
pub struct PortRequestFn<F>(pub F);

#[async_trait]
impl<F, Fut> PortRequestHandler for PortRequestFn<F>
where
    F: Fn(PortId, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, HandlerFailure>> + Send + 'static,
{
    async fn handle(&self, port: PortId, payload: Value) -> Result<Option<Value>, HandlerFailure> {
        (self.0)(port, payload).await
    }
}

//! Typed channel wrappers over the raw string-keyed accessors.
//!
//! Each wrapper pins one wire name to nominal payload types: sends serialize
//! through `serde_json`, handlers deserialize before the typed callback runs.
//! An inbound event payload that fails to deserialize is dropped with a
//! warning; a request payload that fails to deserialize is answered with an
//! `:error` envelope, so the caller always settles. Construction rejects
//! names that collide with the reserved reply-name convention.

use std::marker::PhantomData;

use portlink_core::{is_reserved_name, HandlerFailure, PortId, RequestError, SendError};
use portlink_proto::{
    ClientEvent, ClientNode, ClientRpc, PortEvent, PortHub, PortRequestFn, PortRpc, RequestFn,
    Subscription,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::CatalogError;

fn ensure_organic(name: &str) -> Result<(), CatalogError> {
    if is_reserved_name(name) {
        return Err(CatalogError::ReservedName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Client-side fire-and-forget channel carrying `T`.
pub struct ClientEventChannel<T> {
    raw: ClientEvent,
    _payload: PhantomData<fn(T)>,
}

impl<T> std::fmt::Debug for ClientEventChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEventChannel")
            .field("name", &self.raw.name())
            .finish()
    }
}

impl<T> ClientEventChannel<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind the channel to its wire name on `node`.
    pub fn new(node: &ClientNode, name: &str) -> Result<Self, CatalogError> {
        ensure_organic(name)?;
        Ok(Self {
            raw: node.event(name),
            _payload: PhantomData,
        })
    }

    /// The channel's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Send one typed payload to the primary side.
    pub fn send(&self, payload: &T) -> Result<(), SendError> {
        self.raw.send(serde_json::to_value(payload)?)
    }

    /// Register a typed callback for this event.
    pub fn handle(&self, callback: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        let name = self.raw.name().to_owned();
        self.raw
            .handle(move |value| match serde_json::from_value::<T>(value) {
                Ok(payload) => callback(payload),
                Err(err) => {
                    warn!(event = %name, error = %err, "dropping undecodable event payload");
                }
            })
    }
}

/// Client-side request/response channel carrying `In` and yielding `Out`.
pub struct ClientRequestChannel<In, Out> {
    raw: ClientRpc,
    _io: PhantomData<fn(In) -> Out>,
}

impl<In, Out> ClientRequestChannel<In, Out>
where
    In: Serialize + DeserializeOwned + Send + 'static,
    Out: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind the channel to its wire name on `node`.
    pub fn new(node: &ClientNode, name: &str) -> Result<Self, CatalogError> {
        ensure_organic(name)?;
        Ok(Self {
            raw: node.rpc(name),
            _io: PhantomData,
        })
    }

    /// The channel's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Send a typed request and await the typed reply.
    pub async fn request(&self, input: &In) -> Result<Out, RequestError> {
        let value = serde_json::to_value(input).map_err(SendError::from)?;
        let out = self.raw.request(value).await?;
        Ok(serde_json::from_value(out)?)
    }

    /// Register the typed responder for this request name.
    ///
    /// Unlike the raw layer, a typed handler always replies: success becomes
    /// a `:response` envelope and failure an `:error` envelope, so the
    /// caller always settles.
    pub fn handle<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, HandlerFailure>> + Send + 'static,
    {
        self.raw.handle(RequestFn(move |value: Value| {
            let pending = serde_json::from_value::<In>(value).map(|input| handler(input));
            async move {
                let out = match pending {
                    Ok(fut) => fut.await?,
                    Err(err) => {
                        return Err(HandlerFailure::new(format!("invalid payload: {err}")));
                    }
                };
                encode_reply(out)
            }
        }))
    }
}

/// Primary-side fire-and-forget channel carrying `T`.
pub struct PortEventChannel<T> {
    raw: PortEvent,
    _payload: PhantomData<fn(T)>,
}

impl<T> PortEventChannel<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind the channel to its wire name on `hub`.
    pub fn new(hub: &PortHub, name: &str) -> Result<Self, CatalogError> {
        ensure_organic(name)?;
        Ok(Self {
            raw: hub.event(name),
            _payload: PhantomData,
        })
    }

    /// The channel's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Send one typed payload to exactly the given port.
    pub fn send(&self, port: &PortId, payload: &T) -> Result<(), SendError> {
        self.raw.send(port, serde_json::to_value(payload)?)
    }

    /// Register a typed wildcard callback, invoked for every port.
    pub fn handle(&self, callback: impl Fn(PortId, T) + Send + Sync + 'static) -> Subscription {
        let name = self.raw.name().to_owned();
        self.raw
            .handle(move |port, value| match serde_json::from_value::<T>(value) {
                Ok(payload) => callback(port, payload),
                Err(err) => {
                    warn!(event = %name, port = %port, error = %err, "dropping undecodable event payload");
                }
            })
    }

    /// Register a typed callback scoped to one port.
    pub fn handle_port(
        &self,
        port: &PortId,
        callback: impl Fn(PortId, T) + Send + Sync + 'static,
    ) -> Subscription {
        let name = self.raw.name().to_owned();
        self.raw
            .handle_port(port, move |port, value| {
                match serde_json::from_value::<T>(value) {
                    Ok(payload) => callback(port, payload),
                    Err(err) => {
                        warn!(event = %name, port = %port, error = %err, "dropping undecodable event payload");
                    }
                }
            })
    }
}

/// Primary-side request/response channel carrying `In` and yielding `Out`.
pub struct PortRequestChannel<In, Out> {
    raw: PortRpc,
    _io: PhantomData<fn(In) -> Out>,
}

impl<In, Out> std::fmt::Debug for PortRequestChannel<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRequestChannel")
            .field("name", &self.raw.name())
            .finish()
    }
}

impl<In, Out> PortRequestChannel<In, Out>
where
    In: Serialize + DeserializeOwned + Send + 'static,
    Out: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind the channel to its wire name on `hub`.
    pub fn new(hub: &PortHub, name: &str) -> Result<Self, CatalogError> {
        ensure_organic(name)?;
        Ok(Self {
            raw: hub.rpc(name),
            _io: PhantomData,
        })
    }

    /// The channel's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Send a typed request to the given port and await the typed reply.
    pub async fn request(&self, port: &PortId, input: &In) -> Result<Out, RequestError> {
        let value = serde_json::to_value(input).map_err(SendError::from)?;
        let out = self.raw.request(port, value).await?;
        Ok(serde_json::from_value(out)?)
    }

    /// Register the typed wildcard responder; the handler receives the
    /// originating port and always replies.
    pub fn handle<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(PortId, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, HandlerFailure>> + Send + 'static,
    {
        self.raw.handle(PortRequestFn(move |port: PortId, value: Value| {
            let pending = serde_json::from_value::<In>(value).map(|input| handler(port, input));
            async move {
                let out = match pending {
                    Ok(fut) => fut.await?,
                    Err(err) => {
                        return Err(HandlerFailure::new(format!("invalid payload: {err}")));
                    }
                };
                encode_reply(out)
            }
        }))
    }

    /// Register a typed responder scoped to one port.
    pub fn handle_port<F, Fut>(&self, port: &PortId, handler: F) -> Subscription
    where
        F: Fn(PortId, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, HandlerFailure>> + Send + 'static,
    {
        self.raw
            .handle_port(port, PortRequestFn(move |port: PortId, value: Value| {
                let pending = serde_json::from_value::<In>(value).map(|input| handler(port, input));
                async move {
                    let out = match pending {
                        Ok(fut) => fut.await?,
                        Err(err) => {
                            return Err(HandlerFailure::new(format!("invalid payload: {err}")));
                        }
                    };
                    encode_reply(out)
                }
            }))
    }
}

fn encode_reply<Out: Serialize>(out: Out) -> Result<Option<Value>, HandlerFailure> {
    match serde_json::to_value(out) {
        Ok(value) => Ok(Some(value)),
        Err(err) => Err(HandlerFailure::new(err.to_string())),
    }
}

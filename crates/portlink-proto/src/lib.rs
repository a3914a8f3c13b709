//! # portlink-proto
//!
//! The protocol core: a generic bidirectional event/RPC dispatcher over one
//! duplex channel (client mode) or N channels keyed by port (primary mode).
//!
//! - [`ClientNode`]: the client side — one implicit connection, named
//!   fire-and-forget events and promise-correlated requests
//! - [`PortHub`]: the primary side — many connections addressed by
//!   [`portlink_core::PortId`], wildcard and port-scoped handlers, explicit
//!   port teardown
//! - [`Subscription`]: idempotent unsubscribe guard returned by every
//!   handler registration
//! - Replay queues buffer envelopes that arrive before any handler is
//!   registered and flush them, in arrival order, to the first registration
//! - [`memory`]: in-process transport pair for tests and demos
//!
//! Each node guards its registries with a single mutex; callbacks are never
//! invoked while that lock is held.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod handlers;
pub mod hub;
pub mod memory;
pub mod subscription;
pub mod transport;

mod pending;
mod replay;

pub use client::{ClientEvent, ClientNode, ClientRpc};
pub use config::{CorrelationMode, ProtocolConfig};
pub use handlers::{PortRequestFn, PortRequestHandler, RequestFn, RequestHandler};
pub use hub::{PortEvent, PortHub, PortRpc};
pub use memory::{Loopback, MemoryLink};
pub use subscription::Subscription;
pub use transport::{ClientTransport, PortTransport, TaggedEnvelope};

//! # portlink-core
//!
//! Foundation types for the portlink message-port protocol:
//!
//! - **Wire envelope**: [`Envelope`] — the `{type, data}` unit exchanged over
//!   a port, with the optional `callId` correlation extension
//! - **Reserved names**: `:response` / `:error` derived-name helpers for
//!   request/response completions
//! - **Branded IDs**: [`PortId`] and [`CallId`] as newtypes for type safety
//! - **Errors**: [`SendError`], [`RequestError`], and [`HandlerFailure`]
//!   via `thiserror`

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::{
    base_name, error_name, is_reserved_name, response_name, Envelope, ERROR_SUFFIX,
    RESPONSE_SUFFIX, UNKNOWN_ERROR,
};
pub use errors::{HandlerFailure, RequestError, SendError, TransportError};
pub use ids::{CallId, PortId};

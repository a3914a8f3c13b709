//! # portlink-catalog
//!
//! The event registry layer: a declarative, typed catalogue over the raw
//! string-keyed protocol primitives.
//!
//! - Typed channels — [`ClientEventChannel`], [`ClientRequestChannel`],
//!   [`PortEventChannel`], [`PortRequestChannel`] — pin one wire name to
//!   nominal payload/output types and do the `serde_json` conversion at the
//!   seam
//! - [`define_catalog!`] maps a closed set of human-readable names to
//!   channels for both sides from one declaration, replacing raw
//!   string-keyed calls with a fixed, enumerable catalogue
//! - Construction rejects names colliding with the reserved `:response` /
//!   `:error` reply convention
//!
//! The catalogue performs no I/O of its own; every channel is a thin typed
//! wrapper over an accessor of [`ClientNode`] or [`PortHub`].

#![deny(unsafe_code)]

pub mod channels;
pub mod errors;

mod macros;

pub use channels::{
    ClientEventChannel, ClientRequestChannel, PortEventChannel, PortRequestChannel,
};
pub use errors::CatalogError;

// Re-exported so `define_catalog!` expansions resolve against `$crate`, and
// so catalogue consumers need only this crate in scope.
pub use portlink_proto::{ClientNode, PortHub, Subscription};

//! Branded ID newtypes for type safety.
//!
//! Port and call identifiers are distinct newtype wrappers around `String`,
//! so a connection identifier can never be passed where a correlation token
//! is expected. Generated values are UUID v7 (time-ordered); adapter-supplied
//! values are wrapped as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Stable identifier for one primary-side connection.
    ///
    /// Assigned by the transport adapter when a connection first reports a
    /// message, and distinct across concurrent connections for the life of
    /// each one. Client mode has a single implicit connection and no ID.
    PortId
}

branded_id! {
    /// Per-request correlation token, carried as `callId` on the wire.
    ///
    /// Only present on request/response traffic in per-call correlation
    /// mode; compatibility-mode envelopes never carry one.
    CallId
}

//! Protocol node configuration.

use serde::{Deserialize, Serialize};

/// How request/response pairs are correlated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMode {
    /// Every request mints a `callId` carried on the wire and echoed on the
    /// reply. Concurrent calls to the same event name never collide.
    #[default]
    PerCall,
    /// Legacy single slot per (connection, event name) with no `callId` on
    /// the wire. A second concurrent call on the same name replaces the
    /// first call's resolver; the first caller settles with
    /// `RequestError::Superseded`.
    NameSlot,
}

/// Configuration for one protocol node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Request/response correlation strategy.
    pub correlation: CorrelationMode,
    /// Per-event replay queue bound. `None` keeps queues unbounded, which
    /// matches the wire protocol's original behavior; when set, envelopes
    /// arriving at a full queue are dropped with a warning.
    pub replay_capacity: Option<usize>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            correlation: CorrelationMode::PerCall,
            replay_capacity: None,
        }
    }
}

impl ProtocolConfig {
    /// Configuration matching the legacy wire protocol exactly: name-keyed
    /// correlation slots and unbounded replay queues.
    #[must_use]
    pub fn compat() -> Self {
        Self {
            correlation: CorrelationMode::NameSlot,
            replay_capacity: None,
        }
    }
}

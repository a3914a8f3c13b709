//! Transport adapter seams.
//!
//! The protocol layer never establishes channels itself. An adapter owns the
//! raw duplex channel(s): it implements the outbound trait for its side and
//! pushes every inbound envelope into the node via
//! [`crate::ClientNode::deliver`] / [`crate::PortHub::deliver`]. Adapters
//! must preserve per-connection FIFO ordering; cross-connection ordering is
//! unspecified.

use portlink_core::{Envelope, PortId, TransportError};
use serde::{Deserialize, Serialize};

/// Outbound half of the client's single implicit connection.
pub trait ClientTransport: Send + Sync {
    /// Send one envelope to the primary side.
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Outbound half on the primary side, addressed per port.
///
/// Sending to a port that no longer exists is a silent no-op at the adapter
/// level; the hub logs it.
pub trait PortTransport: Send + Sync {
    /// Send one envelope to exactly the given port.
    fn send(&self, port: &PortId, envelope: Envelope) -> Result<(), TransportError>;
}

/// Primary-side adapter wrapping of one inbound envelope.
///
/// The adapter tags every inbound payload with the stable identifier of the
/// connection it arrived on; the envelope itself never carries the port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedEnvelope {
    /// Originating connection.
    pub port_id: PortId,
    /// The envelope as it appeared on the wire.
    pub payload: Envelope,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_envelope_wire_format() {
        let tagged = TaggedEnvelope {
            port_id: PortId::from("view-1"),
            payload: Envelope::event("theme.changed", json!({"dark": true})),
        };
        let v = serde_json::to_value(&tagged).unwrap();
        assert_eq!(v["portId"], "view-1");
        assert_eq!(v["payload"]["type"], "theme.changed");
        assert_eq!(v["payload"]["data"]["dark"], true);
    }

    #[test]
    fn tagged_envelope_parses_from_raw_json() {
        let raw = r#"{"portId": "view-2", "payload": {"type": "ping", "data": null}}"#;
        let tagged: TaggedEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(tagged.port_id, PortId::from("view-2"));
        assert_eq!(tagged.payload.event_type, "ping");
    }
}

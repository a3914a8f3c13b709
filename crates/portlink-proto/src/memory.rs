//! In-process transport pairing a [`PortHub`] with [`ClientNode`]s.
//!
//! This is the adapter used by tests and demos; real adapters (webview
//! message ports, sockets) live with the host. A [`Loopback`] owns the
//! hub-side routing table and mints one [`PortId`] per linked client. Each
//! direction of a link runs over its own unbounded channel with a pump task,
//! so per-connection FIFO ordering is preserved; ordering across links is
//! unspecified, as the transport contract allows.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use portlink_core::{Envelope, PortId, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::ClientNode;
use crate::hub::PortHub;
use crate::transport::{ClientTransport, PortTransport};

type Routes = Arc<Mutex<HashMap<PortId, mpsc::UnboundedSender<Envelope>>>>;

/// Hub-side outbound half: routes each envelope to the link for its port.
struct Router {
    routes: Routes,
}

impl PortTransport for Router {
    fn send(&self, port: &PortId, envelope: Envelope) -> Result<(), TransportError> {
        let Some(tx) = self.routes.lock().get(port).cloned() else {
            // Sending to a vanished port is a silent no-op per the adapter
            // contract.
            warn!(port = %port, event = %envelope.event_type, "no route for port; envelope dropped");
            return Ok(());
        };
        tx.send(envelope).map_err(|_| TransportError::Closed)
    }
}

/// Client-side outbound half of one link.
struct ClientSide {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ClientTransport for ClientSide {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx.send(envelope).map_err(|_| TransportError::Closed)
    }
}

/// In-process fabric connecting one hub to any number of clients.
///
/// Construction binds the hub's outbound half to a routing table; each
/// [`link`](Self::link) call then wires one client and starts its pump
/// tasks. Requires a tokio runtime.
pub struct Loopback {
    hub: PortHub,
    routes: Routes,
}

impl Loopback {
    /// Bind `hub` to a fresh routing table.
    #[must_use]
    pub fn new(hub: &PortHub) -> Self {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        hub.bind(Router {
            routes: Arc::clone(&routes),
        });
        Self {
            hub: hub.clone(),
            routes,
        }
    }

    /// Connect `client` to the hub over a new duplex link.
    ///
    /// Mints the link's [`PortId`], binds the client's outbound half, and
    /// spawns one pump task per direction. Dropping the returned
    /// [`MemoryLink`] stops the pumps and removes the hub-side route; it
    /// does not close the hub's port bookkeeping — call
    /// [`PortHub::close_port`] for that, as a host adapter would.
    pub fn link(&self, client: &ClientNode) -> MemoryLink {
        let port_id = PortId::new();
        let (client_tx, mut to_hub_rx) = mpsc::unbounded_channel();
        let (hub_tx, mut to_client_rx) = mpsc::unbounded_channel();

        let _ = self.routes.lock().insert(port_id.clone(), hub_tx);
        client.bind(ClientSide { tx: client_tx });

        let hub = self.hub.clone();
        let pump_port = port_id.clone();
        let to_hub = tokio::spawn(async move {
            while let Some(envelope) = to_hub_rx.recv().await {
                hub.deliver(pump_port.clone(), envelope);
            }
        });

        let client = client.clone();
        let to_client = tokio::spawn(async move {
            while let Some(envelope) = to_client_rx.recv().await {
                client.deliver(envelope);
            }
        });

        debug!(port = %port_id, "loopback link established");
        MemoryLink {
            port_id,
            routes: Arc::downgrade(&self.routes),
            pumps: [to_hub, to_client],
        }
    }
}

/// One live duplex link between a hub and a client.
pub struct MemoryLink {
    port_id: PortId,
    routes: Weak<Mutex<HashMap<PortId, mpsc::UnboundedSender<Envelope>>>>,
    pumps: [JoinHandle<()>; 2],
}

impl MemoryLink {
    /// The identifier the hub sees this link's traffic under.
    #[must_use]
    pub fn port_id(&self) -> &PortId {
        &self.port_id
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        if let Some(routes) = self.routes.upgrade() {
            let _ = routes.lock().remove(&self.port_id);
        }
        for pump in &self.pumps {
            pump.abort();
        }
        debug!(port = %self.port_id, "loopback link disconnected");
    }
}

impl std::fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLink")
            .field("port_id", &self.port_id)
            .finish()
    }
}

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use agora_types::events::GatewayEvent;

/// Capacity of the fan-out buffer; slower receivers observe `Lagged`.
const BROADCAST_CAPACITY: usize = 1024;

/// Fans store change notifications out to every gateway connection.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events; connections filter by subscription
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients. A send with no
    /// listeners is not an error.
    pub fn broadcast(&self, event: GatewayEvent) {
        let delivered = self.inner.broadcast_tx.send(event).unwrap_or(0);
        trace!("Gateway event delivered to {} receivers", delivered);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

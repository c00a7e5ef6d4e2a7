use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use shared::{domain::ConnectionId, protocol::ServerEvent};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    Connection(ConnectionId),
    Connections(Vec<ConnectionId>),
    /// Every open connection, identified or not.
    Everyone,
}

/// Outbound half of the network layer, as the hub sees it.
///
/// `publish` is called while the hub holds its state lock, so implementations
/// must only enqueue and return; they must never wait on a socket.
pub trait Transport: Send + Sync {
    fn publish(&self, recipients: Recipients, event: ServerEvent);
}

/// Per-connection unbounded queues. The socket task that owns a connection
/// drains its receiver; a slow or dead socket only grows its own queue.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ConnectionTable {
    pub fn attach(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection, tx);
        rx
    }

    pub fn detach(&self, connection: ConnectionId) -> bool {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection)
            .is_some()
    }
}

impl Transport for ConnectionTable {
    fn publish(&self, recipients: Recipients, event: ServerEvent) {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let deliver = |connection: &ConnectionId, tx: &mpsc::UnboundedSender<ServerEvent>| {
            if tx.send(event.clone()).is_err() {
                trace!(%connection, event = event.name(), "dropping event for closed connection");
            }
        };

        match recipients {
            Recipients::Connection(connection) => {
                if let Some(tx) = senders.get(&connection) {
                    deliver(&connection, tx);
                }
            }
            Recipients::Connections(connections) => {
                for connection in &connections {
                    if let Some(tx) = senders.get(connection) {
                        deliver(connection, tx);
                    }
                }
            }
            Recipients::Everyone => {
                for (connection, tx) in senders.iter() {
                    deliver(connection, tx);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;

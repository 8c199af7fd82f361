use crate::record::{ClientKey, Record};
use log::*;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection information for one push-capable client.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: UnboundedSender<Record>,
}

impl Connection {
    /// The transport side drops its receiver when the socket goes away.
    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Live push channels, at most one per client key.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientKey, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Registers a channel for `key`, replacing any previous one.
    pub fn register(&mut self, key: ClientKey, sender: UnboundedSender<Record>) -> ConnectionId {
        let id = ConnectionId::new();
        let connection = Connection {
            id: id.clone(),
            sender,
        };

        if let Some(previous) = self.connections.insert(key.clone(), connection) {
            info!(
                "Connection {} for {} replaced by {}",
                previous.id.as_str(),
                key,
                id.as_str()
            );
        }
        id
    }

    /// Removes the connection for `key` if it is still the one named by `id`.
    pub fn unregister(&mut self, key: &ClientKey, id: &ConnectionId) -> bool {
        match self.connections.get(key) {
            Some(connection) if &connection.id == id => {
                self.connections.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Whether a connection is registered and open for `key`.
    #[cfg(test)]
    pub(crate) fn is_connected(&self, key: &ClientKey) -> bool {
        self.connections.get(key).is_some_and(Connection::is_open)
    }

    /// Sends `record` over the connection for `key`.
    ///
    /// Hands the record back if there is no open connection; a connection found
    /// closed along the way is dropped from the registry.
    pub fn try_send(&mut self, key: &ClientKey, record: Record) -> Result<(), Record> {
        let Some(connection) = self.connections.get(key) else {
            return Err(record);
        };

        match connection.sender.send(record) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "Failed to push to connection {} for {}, connection will be cleaned up",
                    connection.id.as_str(),
                    key
                );
                self.connections.remove(key);
                Err(e.0)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

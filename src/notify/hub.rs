use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::NotificationError;
use crate::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<String>,
}

/// Registry of live push connections, keyed by the user that owns them.
/// A user may hold any number of connections at once.
pub(crate) struct ConnectionHub {
    connections: DashMap<UserId, Vec<Connection>>,
    next_id: AtomicU64,
}

impl ConnectionHub {
    pub(crate) fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a connection for `user_id`. Messages pushed to the user arrive on
    /// the returned receiver; dropping it closes the connection.
    pub(crate) fn connect(&self, user_id: &UserId) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections
            .entry(user_id.clone())
            .or_default()
            .push(Connection { id, sender });
        debug!("Connection {id} opened for user [{user_id}]");
        (id, receiver)
    }

    pub(crate) fn disconnect(&self, id: ConnectionId) -> bool {
        let mut removed = false;
        self.connections.retain(|_, conns| {
            let before = conns.len();
            conns.retain(|c| c.id != id);
            removed |= conns.len() != before;
            !conns.is_empty()
        });
        if removed {
            debug!("Connection {id} closed");
        }
        removed
    }

    /// Open connections of `user_id`, not counting ones whose receiver is gone.
    pub(crate) fn connection_count(&self, user_id: &UserId) -> usize {
        self.connections
            .get(user_id)
            .map_or(0, |conns| conns.iter().filter(|c| !c.sender.is_closed()).count())
    }

    /// Pushes `message` to every connection of `user_id` and returns how many
    /// received it. A user with no connections is not an error.
    pub(crate) fn deliver_to_user(
        &self,
        user_id: &UserId,
        message: &str,
    ) -> Result<usize, NotificationError> {
        let Some(mut conns) = self.connections.get_mut(user_id) else {
            return Ok(0);
        };
        let attempted = conns.len();
        conns.retain(|c| c.sender.send(message.to_string()).is_ok());
        let delivered = conns.len();
        drop(conns);

        if delivered < attempted {
            debug!("Pruned {} closed connection(s) of user [{user_id}]", attempted - delivered);
            self.connections.remove_if(user_id, |_, conns| conns.is_empty());
        }
        if delivered == 0 && attempted > 0 {
            return Err(NotificationError::Undeliverable {
                user_id: user_id.clone(),
                attempted,
            });
        }
        Ok(delivered)
    }

    /// Pushes `message` to every open connection regardless of owner.
    pub(crate) fn deliver_all(&self, message: &str) -> usize {
        let mut delivered = 0;
        self.connections.retain(|_, conns| {
            conns.retain(|c| c.sender.send(message.to_string()).is_ok());
            delivered += conns.len();
            !conns.is_empty()
        });
        delivered
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

//! Connection registry implementation
//!
//! The canonical record of classified connections: their roles, the producer
//! directory derived from them, and the subscriber set the broadcaster
//! delivers to.
//!
//! The registry itself is not synchronized. It lives behind the single lock
//! owned by [`RelayHub`](crate::relay::RelayHub).

use std::collections::HashMap;

use super::connection::{ConnectionHandle, ConnectionId, Role};
use super::directory::ProducerDirectory;

/// What an [`unregister`](ConnectionRegistry::unregister) call removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Role the connection held
    pub role: Role,
    /// Whether the producer directory lost an entry
    pub directory_changed: bool,
}

/// Registry of all classified connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Role of every classified connection
    roles: HashMap<ConnectionId, Role>,

    /// Producer name to current holder
    directory: ProducerDirectory,

    /// Connections in the subscriber role
    subscribers: HashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `role` for `conn`, overwriting any previous role
    ///
    /// Producers are put into the directory (replacing any holder of the same
    /// name); subscribers join the subscriber set. Returns the producer
    /// connection that was superseded, if any.
    pub fn register(&mut self, conn: &ConnectionHandle, role: Role) -> Option<ConnectionHandle> {
        let id = conn.id();

        if let Some(previous) = self.roles.get(&id) {
            if *previous == role {
                return None;
            }
            // Drop the derived entries of the old role before switching
            self.unregister(id);
        }

        let superseded = match &role {
            Role::Producer(name) => self
                .directory
                .put(name.clone(), conn.clone())
                .filter(|old| old.id() != id),
            Role::Subscriber => {
                self.subscribers.insert(id, conn.clone());
                None
            }
        };

        self.roles.insert(id, role);
        superseded
    }

    /// Remove `conn` from every structure it appears in
    ///
    /// Returns `None` if the connection was not registered, so a second call
    /// for the same connection has no effect.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<Removal> {
        let role = self.roles.remove(&conn)?;

        let directory_changed = match &role {
            Role::Producer(name) => self.directory.remove_if_current(name, conn),
            Role::Subscriber => false,
        };
        self.subscribers.remove(&conn);

        Some(Removal {
            role,
            directory_changed,
        })
    }

    /// Role of `conn`, if registered
    pub fn lookup(&self, conn: ConnectionId) -> Option<&Role> {
        self.roles.get(&conn)
    }

    /// Producer directory view
    pub fn directory(&self) -> &ProducerDirectory {
        &self.directory
    }

    /// Current producer names
    pub fn producer_names(&self) -> Vec<String> {
        self.directory.names()
    }

    /// Current subscribers
    pub fn subscribers(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.subscribers.values()
    }

    /// Subscriber handle for `conn`
    pub fn subscriber(&self, conn: ConnectionId) -> Option<&ConnectionHandle> {
        self.subscribers.get(&conn)
    }

    /// Number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of classified connections
    pub fn connection_count(&self) -> usize {
        self.roles.len()
    }
}

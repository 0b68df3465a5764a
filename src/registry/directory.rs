//! Producer directory
//!
//! Maps a producer name to the connection currently streaming under it.

use std::collections::BTreeMap;

use super::connection::{ConnectionHandle, ConnectionId};

/// Name to connection mapping of live producers
///
/// At most one connection per name. A later registration under an existing
/// name replaces the entry.
#[derive(Debug, Default)]
pub struct ProducerDirectory {
    entries: BTreeMap<String, ConnectionHandle>,
}

impl ProducerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection for `name`, returning the connection it replaced
    pub fn put(&mut self, name: impl Into<String>, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries.insert(name.into(), conn)
    }

    /// Remove `name` only if `conn` is still the registered holder
    ///
    /// Returns `true` if the entry was removed. A disconnect from a superseded
    /// connection leaves the newer holder in place and returns `false`.
    pub fn remove_if_current(&mut self, name: &str, conn: ConnectionId) -> bool {
        match self.get(name) {
            Some(current) if current.id() == conn => {
                self.entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Connection currently registered under `name`
    pub fn get(&self, name: &str) -> Option<&ConnectionHandle> {
        self.entries.get(name)
    }

    /// Registered producer names, in ascending order
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of registered producers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no producer is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u64) -> ConnectionHandle {
        ConnectionHandle::channel(ConnectionId(id), 1).0
    }

    #[test]
    fn test_names_track_distinct_registrations() {
        let mut dir = ProducerDirectory::new();
        dir.put("cam2", handle(2));
        dir.put("cam1", handle(1));
        dir.put("desk", handle(3));

        assert_eq!(dir.names(), vec!["cam1", "cam2", "desk"]);

        assert!(dir.remove_if_current("cam2", ConnectionId(2)));
        assert_eq!(dir.names(), vec!["cam1", "desk"]);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_put_replaces_existing_name() {
        let mut dir = ProducerDirectory::new();
        assert!(dir.put("cam1", handle(1)).is_none());

        let replaced = dir.put("cam1", handle(2)).unwrap();

        assert_eq!(replaced.id(), ConnectionId(1));
        assert_eq!(dir.get("cam1").map(|h| h.id()), Some(ConnectionId(2)));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_superseded_connection_cannot_evict_newer_holder() {
        let mut dir = ProducerDirectory::new();
        dir.put("cam1", handle(1));
        dir.put("cam1", handle(2));

        assert!(!dir.remove_if_current("cam1", ConnectionId(1)));
        assert_eq!(dir.get("cam1").map(|h| h.id()), Some(ConnectionId(2)));

        assert!(dir.remove_if_current("cam1", ConnectionId(2)));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_remove_unknown_name_is_noop() {
        let mut dir = ProducerDirectory::new();
        assert!(!dir.remove_if_current("missing", ConnectionId(1)));
    }

    #[test]
    fn test_name_with_delimiter_is_kept_verbatim() {
        let mut dir = ProducerDirectory::new();
        dir.put("office:left", handle(1));
        assert_eq!(dir.names(), vec!["office:left"]);
    }
}

//! Relay hub
//!
//! Owns the connection registry behind a single lock and sequences every
//! registry mutation with the broadcast it triggers.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::registry::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, Removal, Role, SendError,
};
use crate::stats::RelayStats;

use super::fanout::{self, DeliveryReport};

/// Shared state of the relay
///
/// All registry reads and writes go through one `Mutex`. Sends made while the
/// lock is held only enqueue onto bounded per-connection queues, so a slow
/// peer never holds up the lock.
pub struct RelayHub {
    registry: Mutex<ConnectionRegistry>,
    stats: Arc<RelayStats>,
}

impl RelayHub {
    /// Create a hub with fresh statistics
    pub fn new() -> Self {
        Self::with_stats(Arc::new(RelayStats::new()))
    }

    /// Create a hub that records into `stats`
    pub fn with_stats(stats: Arc<RelayStats>) -> Self {
        Self {
            registry: Mutex::new(ConnectionRegistry::new()),
            stats,
        }
    }

    /// Relay statistics
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Register `conn` as the producer for `name` and announce the new list
    pub async fn register_producer(&self, name: &str, conn: &ConnectionHandle) -> DeliveryReport {
        let mut registry = self.registry.lock().await;

        if let Some(old) = registry.register(conn, Role::Producer(name.to_string())) {
            tracing::warn!(
                producer = %name,
                connection_id = %conn.id(),
                superseded = %old.id(),
                "Producer name taken over by new connection"
            );
        }
        self.stats.producer_registered();

        tracing::info!(
            producer = %name,
            connection_id = %conn.id(),
            subscribers = registry.subscriber_count(),
            "Producer registered"
        );

        self.announce_locked(&mut registry)
    }

    /// Register `conn` as a subscriber and send it the current producer list
    ///
    /// The list is queued before the lock is released, so it precedes any
    /// frame relayed to this subscriber.
    pub async fn register_subscriber(&self, conn: &ConnectionHandle) -> Result<(), SendError> {
        let mut registry = self.registry.lock().await;
        registry.register(conn, Role::Subscriber);

        tracing::info!(
            connection_id = %conn.id(),
            subscribers = registry.subscriber_count(),
            "Subscriber registered"
        );

        self.send_list_locked(&mut registry, conn)
    }

    /// Remove `conn` from the registry
    ///
    /// Announces the producer list if `conn` was the current holder of its
    /// producer name. Returns `None` if `conn` was already gone.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<Removal> {
        let mut registry = self.registry.lock().await;
        let removal = registry.unregister(conn)?;

        match &removal.role {
            Role::Producer(name) => {
                tracing::info!(
                    producer = %name,
                    connection_id = %conn,
                    current = removal.directory_changed,
                    "Producer unregistered"
                );
            }
            Role::Subscriber => {
                tracing::info!(
                    connection_id = %conn,
                    subscribers = registry.subscriber_count(),
                    "Subscriber unregistered"
                );
            }
        }

        if removal.directory_changed {
            self.announce_locked(&mut registry);
        }

        Some(removal)
    }

    /// Relay a producer frame to every subscriber
    pub async fn broadcast_frame(&self, frame: Bytes) -> DeliveryReport {
        let mut registry = self.registry.lock().await;
        let report = fanout::broadcast_frame(&mut registry, &frame);

        self.stats.frame_relayed(report.delivered);
        self.stats.subscribers_pruned(report.pruned.len());

        tracing::trace!(
            bytes = frame.len(),
            delivered = report.delivered,
            "Frame relayed"
        );

        report
    }

    /// Send the current producer list to every subscriber
    pub async fn announce_producer_list(&self) -> DeliveryReport {
        let mut registry = self.registry.lock().await;
        self.announce_locked(&mut registry)
    }

    /// Send the current producer list to `conn` only
    pub async fn send_producer_list(&self, conn: &ConnectionHandle) -> Result<(), SendError> {
        let mut registry = self.registry.lock().await;
        self.send_list_locked(&mut registry, conn)
    }

    /// Role of `conn`, if registered
    pub async fn lookup(&self, conn: ConnectionId) -> Option<Role> {
        self.registry.lock().await.lookup(conn).cloned()
    }

    /// Current producer names
    pub async fn producer_names(&self) -> Vec<String> {
        self.registry.lock().await.producer_names()
    }

    /// Number of current subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.registry.lock().await.subscriber_count()
    }

    fn announce_locked(&self, registry: &mut ConnectionRegistry) -> DeliveryReport {
        let report = fanout::announce_producer_list(registry);

        self.stats.list_sent(report.delivered);
        self.stats.subscribers_pruned(report.pruned.len());

        if report.attempted() > 0 {
            tracing::debug!(
                producers = registry.directory().len(),
                delivered = report.delivered,
                "Producer list announced"
            );
        }

        report
    }

    fn send_list_locked(
        &self,
        registry: &mut ConnectionRegistry,
        conn: &ConnectionHandle,
    ) -> Result<(), SendError> {
        let result = fanout::send_producer_list(registry, conn);

        match result {
            Ok(()) => self.stats.list_sent(1),
            Err(_) => self.stats.subscribers_pruned(1),
        }

        result
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::Outbound;

    fn conn(id: u64) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        ConnectionHandle::channel(ConnectionId(id), 16)
    }

    fn drain_texts(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Text(t) = item {
                out.push(t.to_string());
            }
        }
        out
    }

    fn pc_list(names: &[&str]) -> String {
        let names = names.iter().map(|n| n.to_string()).collect();
        crate::relay::RelayEvent::producer_list(names)
            .to_json()
            .unwrap()
    }

    #[tokio::test]
    async fn test_producer_registration_announces_once() {
        let hub = RelayHub::new();
        let (sub, mut sub_rx) = conn(1);
        hub.register_subscriber(&sub).await.unwrap();
        assert_eq!(drain_texts(&mut sub_rx), vec![pc_list(&[])]);

        let (producer, _prx) = conn(2);
        let report = hub.register_producer("cam1", &producer).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(drain_texts(&mut sub_rx), vec![pc_list(&["cam1"])]);
        assert_eq!(hub.producer_names().await, vec!["cam1"]);
        assert_eq!(
            hub.lookup(ConnectionId(2)).await,
            Some(Role::Producer("cam1".into()))
        );
    }

    #[tokio::test]
    async fn test_new_subscriber_gets_current_list() {
        let hub = RelayHub::new();
        let (producer, _prx) = conn(1);
        hub.register_producer("desk", &producer).await;

        let (sub, mut sub_rx) = conn(2);
        tokio_test::assert_ok!(hub.register_subscriber(&sub).await);

        assert_eq!(drain_texts(&mut sub_rx), vec![pc_list(&["desk"])]);
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_producer_disconnect_announces() {
        let hub = RelayHub::new();
        let (producer, _prx) = conn(1);
        let (sub, mut sub_rx) = conn(2);
        hub.register_producer("cam1", &producer).await;
        hub.register_subscriber(&sub).await.unwrap();
        drain_texts(&mut sub_rx);

        let removal = hub.unregister(ConnectionId(1)).await.unwrap();

        assert!(removal.directory_changed);
        assert_eq!(drain_texts(&mut sub_rx), vec![pc_list(&[])]);
    }

    #[tokio::test]
    async fn test_superseded_producer_disconnect_is_silent() {
        let hub = RelayHub::new();
        let (first, _rx1) = conn(1);
        let (second, _rx2) = conn(2);
        let (sub, mut sub_rx) = conn(3);
        hub.register_subscriber(&sub).await.unwrap();
        hub.register_producer("cam1", &first).await;
        hub.register_producer("cam1", &second).await;
        drain_texts(&mut sub_rx);

        let removal = hub.unregister(ConnectionId(1)).await.unwrap();

        assert!(!removal.directory_changed);
        assert!(drain_texts(&mut sub_rx).is_empty());
        assert_eq!(hub.producer_names().await, vec!["cam1"]);
    }

    #[tokio::test]
    async fn test_unregister_twice() {
        let hub = RelayHub::new();
        let (sub, _rx) = conn(1);
        hub.register_subscriber(&sub).await.unwrap();

        assert!(hub.unregister(ConnectionId(1)).await.is_some());
        assert!(hub.unregister(ConnectionId(1)).await.is_none());
        assert_eq!(hub.subscriber_count().await, 0);
        assert_eq!(hub.lookup(ConnectionId(1)).await, None);
    }

    #[tokio::test]
    async fn test_broadcast_frame_updates_stats() {
        let hub = RelayHub::new();
        let (a, _rx_a) = conn(1);
        let (b, rx_b) = conn(2);
        hub.register_subscriber(&a).await.unwrap();
        hub.register_subscriber(&b).await.unwrap();
        drop(rx_b);

        let report = hub.broadcast_frame(Bytes::from_static(&[1, 2, 3])).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![ConnectionId(2)]);
        let snap = hub.stats().snapshot();
        assert_eq!(snap.frames_relayed, 1);
        assert_eq!(snap.frame_deliveries, 1);
        assert_eq!(snap.subscribers_pruned, 1);
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_announce_producer_list_reaches_all_subscribers() {
        let hub = RelayHub::new();
        let (producer, _prx) = conn(1);
        let (a, mut rx_a) = conn(2);
        let (b, mut rx_b) = conn(3);
        hub.register_producer("cam1", &producer).await;
        hub.register_subscriber(&a).await.unwrap();
        hub.register_subscriber(&b).await.unwrap();
        drain_texts(&mut rx_a);
        drain_texts(&mut rx_b);

        let report = hub.announce_producer_list().await;

        assert_eq!(report.delivered, 2);
        assert_eq!(drain_texts(&mut rx_a), vec![pc_list(&["cam1"])]);
        assert_eq!(drain_texts(&mut rx_b), vec![pc_list(&["cam1"])]);
        assert_eq!(hub.stats().snapshot().list_messages_sent, 4);
    }

    #[tokio::test]
    async fn test_send_producer_list_to_one() {
        let hub = RelayHub::new();
        let (a, mut rx_a) = conn(1);
        let (b, mut rx_b) = conn(2);
        hub.register_subscriber(&a).await.unwrap();
        hub.register_subscriber(&b).await.unwrap();
        drain_texts(&mut rx_a);
        drain_texts(&mut rx_b);

        hub.send_producer_list(&a).await.unwrap();

        assert_eq!(drain_texts(&mut rx_a).len(), 1);
        assert!(drain_texts(&mut rx_b).is_empty());
    }
}

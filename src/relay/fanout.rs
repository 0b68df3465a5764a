//! Fan-out broadcaster
//!
//! Best-effort delivery to every subscriber in the registry. Each send is
//! independent: a subscriber that cannot take a message is pruned from the
//! registry and evicted, and delivery to the others continues.
//!
//! These functions operate on a registry the caller has already locked, so a
//! snapshot and its delivery are never interleaved with a registry mutation.

use std::sync::Arc;

use bytes::Bytes;

use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, SendError};

use super::message::RelayEvent;

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers the message was queued for
    pub delivered: usize,
    /// Subscribers removed because the send failed
    pub pruned: Vec<ConnectionId>,
}

impl DeliveryReport {
    /// Number of subscribers the fan-out was attempted for
    pub fn attempted(&self) -> usize {
        self.delivered + self.pruned.len()
    }
}

/// Send `frame` to every subscriber
pub fn broadcast_frame(registry: &mut ConnectionRegistry, frame: &Bytes) -> DeliveryReport {
    fan_out(registry, "frame", |sub| sub.send_binary(frame.clone()))
}

/// Send the current producer list to every subscriber
///
/// Does nothing when there are no subscribers.
pub fn announce_producer_list(registry: &mut ConnectionRegistry) -> DeliveryReport {
    if registry.subscriber_count() == 0 {
        return DeliveryReport::default();
    }

    let Some(text) = producer_list_text(registry) else {
        return DeliveryReport::default();
    };

    fan_out(registry, "producer list", |sub| sub.send_text(Arc::clone(&text)))
}

/// Send the current producer list to a single connection
///
/// A failed send prunes and evicts that connection.
pub fn send_producer_list(
    registry: &mut ConnectionRegistry,
    conn: &ConnectionHandle,
) -> Result<(), SendError> {
    let Some(text) = producer_list_text(registry) else {
        return Ok(());
    };

    conn.send_text(text).inspect_err(|e| {
        tracing::warn!(
            connection_id = %conn.id(),
            error = %e,
            "Failed to send producer list"
        );
        prune(registry, std::slice::from_ref(conn));
    })
}

fn producer_list_text(registry: &ConnectionRegistry) -> Option<Arc<str>> {
    match RelayEvent::producer_list(registry.producer_names()).to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode producer list");
            None
        }
    }
}

fn fan_out<F>(registry: &mut ConnectionRegistry, what: &str, mut send: F) -> DeliveryReport
where
    F: FnMut(&ConnectionHandle) -> Result<(), SendError>,
{
    let mut delivered = 0;
    let mut failed = Vec::new();

    for sub in registry.subscribers() {
        match send(sub) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    connection_id = %sub.id(),
                    error = %e,
                    "Failed to send {} to subscriber",
                    what
                );
                failed.push(sub.clone());
            }
        }
    }

    let pruned = prune(registry, &failed);
    DeliveryReport { delivered, pruned }
}

fn prune(registry: &mut ConnectionRegistry, failed: &[ConnectionHandle]) -> Vec<ConnectionId> {
    let mut pruned = Vec::with_capacity(failed.len());

    for conn in failed {
        if registry.unregister(conn.id()).is_some() {
            pruned.push(conn.id());
        }
        conn.evict();
    }

    if !pruned.is_empty() {
        tracing::info!(
            pruned = pruned.len(),
            remaining = registry.subscriber_count(),
            "Removed dead subscribers"
        );
    }

    pruned
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::{Outbound, Role};

    fn subscribe(
        registry: &mut ConnectionRegistry,
        id: u64,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId(id), capacity);
        registry.register(&handle, Role::Subscriber);
        (handle, rx)
    }

    fn text(item: Option<Outbound>) -> String {
        match item {
            Some(Outbound::Text(t)) => t.to_string(),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let mut registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = subscribe(&mut registry, 1, 4);
        let (_b, mut rx_b) = subscribe(&mut registry, 2, 4);

        let frame = Bytes::from_static(&[0x01, 0x02]);
        let report = broadcast_frame(&mut registry, &frame);

        assert_eq!(report.delivered, 2);
        assert!(report.pruned.is_empty());
        assert_eq!(rx_a.try_recv().ok(), Some(Outbound::Binary(frame.clone())));
        assert_eq!(rx_b.try_recv().ok(), Some(Outbound::Binary(frame)));
    }

    #[test]
    fn test_broadcast_prunes_failed_subscribers_only() {
        let mut registry = ConnectionRegistry::new();
        let (_ok1, mut rx_ok1) = subscribe(&mut registry, 1, 4);
        let (dead, rx_dead) = subscribe(&mut registry, 2, 4);
        let (_ok2, mut rx_ok2) = subscribe(&mut registry, 3, 4);
        let (full, _rx_full) = subscribe(&mut registry, 4, 1);
        drop(rx_dead);
        full.send_binary(Bytes::from_static(b"backlog")).unwrap();

        let report = broadcast_frame(&mut registry, &Bytes::from_static(b"frame"));

        // N = 4 subscribers, K = 2 failures
        assert_eq!(report.attempted(), 4);
        assert_eq!(report.delivered, 2);
        let mut pruned = report.pruned.clone();
        pruned.sort();
        assert_eq!(pruned, vec![ConnectionId(2), ConnectionId(4)]);

        assert_eq!(registry.subscriber_count(), 2);
        assert!(registry.lookup(ConnectionId(2)).is_none());
        assert!(registry.lookup(ConnectionId(4)).is_none());
        assert!(dead.is_evicted());
        assert!(full.is_evicted());
        assert!(rx_ok1.try_recv().is_ok());
        assert!(rx_ok2.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let mut registry = ConnectionRegistry::new();
        let report = broadcast_frame(&mut registry, &Bytes::from_static(b"x"));
        assert_eq!(report, DeliveryReport::default());
    }

    #[test]
    fn test_announce_sends_same_snapshot_to_all() {
        let mut registry = ConnectionRegistry::new();
        let (producer, _prx) = ConnectionHandle::channel(ConnectionId(10), 1);
        registry.register(&producer, Role::Producer("cam1".into()));
        let (_a, mut rx_a) = subscribe(&mut registry, 1, 4);
        let (_b, mut rx_b) = subscribe(&mut registry, 2, 4);

        let report = announce_producer_list(&mut registry);

        assert_eq!(report.delivered, 2);
        let expected = r#"{"type":"pc_list","pcs":["cam1"]}"#;
        assert_eq!(text(rx_a.try_recv().ok()), expected);
        assert_eq!(text(rx_b.try_recv().ok()), expected);
    }

    #[test]
    fn test_announce_without_subscribers_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let (producer, mut prx) = ConnectionHandle::channel(ConnectionId(10), 1);
        registry.register(&producer, Role::Producer("cam1".into()));

        let report = announce_producer_list(&mut registry);

        assert_eq!(report.attempted(), 0);
        assert!(prx.try_recv().is_err());
    }

    #[test]
    fn test_announce_prunes_failed_subscriber() {
        let mut registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = subscribe(&mut registry, 1, 4);
        let (_b, rx_b) = subscribe(&mut registry, 2, 4);
        drop(rx_b);

        let report = announce_producer_list(&mut registry);

        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![ConnectionId(2)]);
        assert_eq!(text(rx_a.try_recv().ok()), r#"{"type":"pc_list","pcs":[]}"#);
    }

    #[test]
    fn test_send_producer_list_to_one() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut rx_a) = subscribe(&mut registry, 1, 4);
        let (_b, mut rx_b) = subscribe(&mut registry, 2, 4);

        send_producer_list(&mut registry, &a).unwrap();

        assert_eq!(text(rx_a.try_recv().ok()), r#"{"type":"pc_list","pcs":[]}"#);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_send_producer_list_failure_prunes() {
        let mut registry = ConnectionRegistry::new();
        let (a, rx_a) = subscribe(&mut registry, 1, 4);
        drop(rx_a);

        let result = send_producer_list(&mut registry, &a);

        assert_eq!(result, Err(SendError::Closed(ConnectionId(1))));
        assert_eq!(registry.subscriber_count(), 0);
        assert!(a.is_evicted());
    }
}

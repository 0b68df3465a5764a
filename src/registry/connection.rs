//! Connection identity and send handles
//!
//! This module defines the key types for identifying connections and the
//! handle the relay uses to push data to a connection's outbound queue.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::SendError;

/// Unique identifier for a connection, assigned at accept time and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Role of a classified connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Supplies binary frames under a declared name
    Producer(String),
    /// Receives relayed frames and producer list updates
    Subscriber,
}

/// Item queued for delivery to a connection
///
/// Cheap to clone: binary payloads are reference counted `Bytes` and text is
/// an `Arc<str>`, so one fan-out shares a single allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Binary frame
    Binary(Bytes),
    /// Text message
    Text(Arc<str>),
    /// Close the connection with a WebSocket close code
    Close { code: u16, reason: String },
}

/// Sending side of a live connection
///
/// Sends never block: they enqueue onto the connection's bounded outbound
/// queue and fail immediately when the queue is full or its writer is gone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    eviction: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle over an outbound queue
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            eviction: CancellationToken::new(),
        }
    }

    /// Create a handle together with its outbound queue
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(id, tx), rx)
    }

    /// Connection identity
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a binary frame
    pub fn send_binary(&self, data: Bytes) -> Result<(), SendError> {
        self.enqueue(Outbound::Binary(data))
    }

    /// Queue a text message
    pub fn send_text(&self, text: Arc<str>) -> Result<(), SendError> {
        self.enqueue(Outbound::Text(text))
    }

    /// Queue a close frame
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), SendError> {
        self.enqueue(Outbound::Close {
            code,
            reason: reason.into(),
        })
    }

    fn enqueue(&self, item: Outbound) -> Result<(), SendError> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => SendError::Closed(self.id),
        })
    }

    /// Mark this connection as dropped by the relay
    ///
    /// The connection's handler observes this through [`evicted`](Self::evicted)
    /// and ends its session.
    pub fn evict(&self) {
        self.eviction.cancel();
    }

    /// Whether [`evict`](Self::evict) has been called on any clone of this handle
    pub fn is_evicted(&self) -> bool {
        self.eviction.is_cancelled()
    }

    /// Resolves once the connection has been evicted
    pub async fn evicted(&self) {
        self.eviction.cancelled().await
    }

    /// Resolves once the outbound queue's receiver (the writer) is gone
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Whether the outbound queue's receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_queue() {
        let (handle, mut rx) = ConnectionHandle::channel(ConnectionId(1), 4);

        handle.send_binary(Bytes::from_static(&[1, 2])).unwrap();
        handle.send_text(Arc::from("hello")).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Binary(Bytes::from_static(&[1, 2])))
        );
        assert_eq!(rx.recv().await, Some(Outbound::Text(Arc::from("hello"))));
    }

    #[test]
    fn test_send_fails_when_queue_full() {
        let (handle, _rx) = ConnectionHandle::channel(ConnectionId(7), 1);

        handle.send_binary(Bytes::from_static(b"a")).unwrap();
        let result = handle.send_binary(Bytes::from_static(b"b"));

        assert_eq!(result, Err(SendError::QueueFull(ConnectionId(7))));
    }

    #[test]
    fn test_send_fails_when_writer_gone() {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId(3), 8);
        drop(rx);

        assert!(handle.is_closed());
        assert_eq!(
            handle.send_text(Arc::from("x")),
            Err(SendError::Closed(ConnectionId(3)))
        );
    }

    #[tokio::test]
    async fn test_eviction_is_shared_between_clones() {
        let (handle, _rx) = ConnectionHandle::channel(ConnectionId(9), 1);
        let clone = handle.clone();

        assert!(!handle.is_evicted());
        clone.evict();

        assert!(handle.is_evicted());
        handle.evicted().await;
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (handle, _rx) = ConnectionHandle::channel(ConnectionId(1), 0);
        assert!(handle.send_binary(Bytes::new()).is_ok());
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(42).to_string(), "conn-42");
    }
}

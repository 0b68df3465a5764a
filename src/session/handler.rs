//! Per-connection session handler
//!
//! Reads the identification message, registers the connection with the hub,
//! then runs the producer or subscriber loop until the peer goes away. Every
//! exit path ends with a single unregister, which is a no-op if the
//! broadcaster already pruned the connection.

use std::fmt::Display;
use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::registry::ConnectionHandle;
use crate::relay::{ControlMessage, Identification, RelayHub};

use super::context::SessionContext;
use super::state::SessionState;

/// WebSocket close code sent when identification fails (policy violation)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Message received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Bytes),
}

/// Why a connection was refused at identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Text that is neither `STREAMER:<name>` nor `CLIENT`
    Unrecognized,
    /// Binary message where identification text was expected
    BinaryIdentification,
    /// No identification within the configured timeout
    Timeout,
}

impl RejectReason {
    /// Close reason sent to the peer
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::Unrecognized => "unrecognized identification",
            RejectReason::BinaryIdentification => "identification must be text",
            RejectReason::Timeout => "identification timeout",
        }
    }
}

/// How a producer or subscriber loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// Peer closed the connection
    Disconnected,
    /// Receive failed or the writer shut down
    TransportError,
    /// Peer sent a message type its role does not accept
    ProtocolViolation,
    /// The relay dropped the connection after a failed send
    Evicted,
}

/// Result of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Connection ended before sending an identification message
    DisconnectedBeforeInit,
    /// Identification refused; the connection was closed without a role
    Rejected(RejectReason),
    /// Producer session ended
    ProducerClosed { name: String, end: LoopEnd },
    /// Subscriber session ended
    SubscriberClosed { end: LoopEnd },
}

enum Next<E> {
    Message(Inbound),
    Closed,
    Failed(E),
    Evicted,
    WriterClosed,
}

async fn next_message<I, E>(conn: &ConnectionHandle, inbound: &mut I) -> Next<E>
where
    I: Stream<Item = Result<Inbound, E>> + Unpin,
{
    tokio::select! {
        item = inbound.next() => match item {
            Some(Ok(msg)) => Next::Message(msg),
            Some(Err(e)) => Next::Failed(e),
            None => Next::Closed,
        },
        _ = conn.evicted() => Next::Evicted,
        _ = conn.closed() => Next::WriterClosed,
    }
}

/// Drives one connection through its lifecycle
pub struct SessionHandler {
    ctx: SessionContext,
    state: SessionState,
    hub: Arc<RelayHub>,
    conn: ConnectionHandle,
}

impl SessionHandler {
    /// Create a handler for an accepted connection
    pub fn new(ctx: SessionContext, hub: Arc<RelayHub>, conn: ConnectionHandle) -> Self {
        let state = SessionState::new(ctx.connection_id, ctx.peer_addr);
        Self {
            ctx,
            state,
            hub,
            conn,
        }
    }

    /// Run the session over `inbound` until it ends
    ///
    /// `inbound` yields messages from the peer; `None` is a clean close and an
    /// `Err` is a transport failure. Neither is propagated: both end the loop
    /// and run the normal cleanup.
    pub async fn run<S, E>(mut self, inbound: S) -> SessionOutcome
    where
        S: Stream<Item = Result<Inbound, E>>,
        E: Display,
    {
        let mut inbound = pin!(inbound);
        self.state.await_identification();

        let outcome = match self.identify(&mut inbound).await {
            Ok(Identification::Producer(name)) => self.run_producer(&mut inbound, name).await,
            Ok(Identification::Subscriber) => self.run_subscriber(&mut inbound).await,
            Err(outcome) => outcome,
        };

        self.state.close();
        tracing::debug!(
            connection_id = %self.ctx.connection_id,
            duration_ms = self.state.stats.duration.as_millis() as u64,
            frames = self.state.stats.frames_received,
            bytes = self.state.stats.bytes_received,
            bitrate = self.state.stats.bitrate(),
            outcome = ?outcome,
            "Session finished"
        );

        outcome
    }

    async fn identify<I, E>(&mut self, inbound: &mut I) -> Result<Identification, SessionOutcome>
    where
        I: Stream<Item = Result<Inbound, E>> + Unpin,
        E: Display,
    {
        let next = next_message(&self.conn, inbound);
        let next = match self.ctx.identify_timeout {
            Some(limit) => match tokio::time::timeout(limit, next).await {
                Ok(next) => next,
                Err(_) => return Err(self.reject(RejectReason::Timeout)),
            },
            None => next.await,
        };

        match next {
            Next::Message(Inbound::Text(text)) => match Identification::parse(&text) {
                Some(id) => Ok(id),
                None => {
                    tracing::warn!(
                        connection_id = %self.ctx.connection_id,
                        peer = %self.ctx.peer_addr,
                        message = %text.chars().take(64).collect::<String>(),
                        "Unrecognized identification message"
                    );
                    Err(self.reject(RejectReason::Unrecognized))
                }
            },
            Next::Message(Inbound::Binary(_)) => Err(self.reject(RejectReason::BinaryIdentification)),
            Next::Failed(e) => {
                tracing::warn!(
                    connection_id = %self.ctx.connection_id,
                    error = %e,
                    "Receive failed before identification"
                );
                Err(SessionOutcome::DisconnectedBeforeInit)
            }
            Next::Closed | Next::Evicted | Next::WriterClosed => {
                tracing::info!(
                    connection_id = %self.ctx.connection_id,
                    peer = %self.ctx.peer_addr,
                    "Disconnected before identification"
                );
                Err(SessionOutcome::DisconnectedBeforeInit)
            }
        }
    }

    fn reject(&self, reason: RejectReason) -> SessionOutcome {
        self.hub.stats().session_rejected();

        tracing::warn!(
            connection_id = %self.ctx.connection_id,
            peer = %self.ctx.peer_addr,
            reason = reason.message(),
            "Connection rejected"
        );

        if let Err(e) = self.conn.close(CLOSE_POLICY_VIOLATION, reason.message()) {
            tracing::debug!(
                connection_id = %self.ctx.connection_id,
                error = %e,
                "Could not queue close frame"
            );
        }

        SessionOutcome::Rejected(reason)
    }

    async fn run_producer<I, E>(&mut self, inbound: &mut I, name: String) -> SessionOutcome
    where
        I: Stream<Item = Result<Inbound, E>> + Unpin,
        E: Display,
    {
        self.state.classify_producer(&name);
        self.hub.register_producer(&name, &self.conn).await;

        let end = loop {
            match next_message(&self.conn, inbound).await {
                Next::Message(Inbound::Binary(frame)) => {
                    self.state.on_frame(frame.len());
                    self.hub.broadcast_frame(frame).await;
                }
                Next::Message(Inbound::Text(_)) => {
                    tracing::warn!(
                        connection_id = %self.ctx.connection_id,
                        producer = %name,
                        "Producer sent text where a frame was expected"
                    );
                    break LoopEnd::ProtocolViolation;
                }
                Next::Closed => break LoopEnd::Disconnected,
                Next::Failed(e) => {
                    tracing::warn!(
                        connection_id = %self.ctx.connection_id,
                        producer = %name,
                        error = %e,
                        "Error receiving from producer"
                    );
                    break LoopEnd::TransportError;
                }
                Next::Evicted => break LoopEnd::Evicted,
                Next::WriterClosed => break LoopEnd::TransportError,
            }
        };

        self.hub.unregister(self.conn.id()).await;

        tracing::info!(
            connection_id = %self.ctx.connection_id,
            producer = %name,
            frames = self.state.stats.frames_received,
            end = ?end,
            "Producer disconnected"
        );

        SessionOutcome::ProducerClosed { name, end }
    }

    async fn run_subscriber<I, E>(&mut self, inbound: &mut I) -> SessionOutcome
    where
        I: Stream<Item = Result<Inbound, E>> + Unpin,
        E: Display,
    {
        self.state.classify_subscriber();
        if let Err(e) = self.hub.register_subscriber(&self.conn).await {
            // Already pruned and evicted; the loop below exits immediately
            tracing::warn!(
                connection_id = %self.ctx.connection_id,
                error = %e,
                "Initial producer list not delivered"
            );
        }

        let end = loop {
            match next_message(&self.conn, inbound).await {
                Next::Message(Inbound::Text(text)) => match ControlMessage::parse(&text) {
                    Some(ControlMessage::ListProducers) => {
                        self.state.on_list_request();
                        if self.hub.send_producer_list(&self.conn).await.is_err() {
                            break LoopEnd::Evicted;
                        }
                    }
                    None => {
                        tracing::debug!(
                            connection_id = %self.ctx.connection_id,
                            "Ignoring unknown control message"
                        );
                    }
                },
                Next::Message(Inbound::Binary(_)) => {
                    tracing::warn!(
                        connection_id = %self.ctx.connection_id,
                        "Subscriber sent binary where text was expected"
                    );
                    break LoopEnd::ProtocolViolation;
                }
                Next::Closed => break LoopEnd::Disconnected,
                Next::Failed(e) => {
                    tracing::warn!(
                        connection_id = %self.ctx.connection_id,
                        error = %e,
                        "Error receiving from subscriber"
                    );
                    break LoopEnd::TransportError;
                }
                Next::Evicted => break LoopEnd::Evicted,
                Next::WriterClosed => break LoopEnd::TransportError,
            }
        };

        self.hub.unregister(self.conn.id()).await;

        tracing::info!(
            connection_id = %self.ctx.connection_id,
            list_requests = self.state.stats.list_requests,
            end = ?end,
            "Subscriber disconnected"
        );

        SessionOutcome::SubscriberClosed { end }
    }
}

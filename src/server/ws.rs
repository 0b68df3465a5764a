//! WebSocket transport adapter
//!
//! Bridges an axum `WebSocket` to a [`SessionHandler`]: the socket's read half
//! becomes the handler's inbound stream and a writer task drains the
//! connection's outbound queue into the write half.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use std::fmt::Display;

use futures::{future, Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::registry::{ConnectionHandle, ConnectionId, Outbound};
use crate::relay::RelayHub;
use crate::session::{Inbound, SessionContext, SessionHandler, SessionOutcome};

/// Run a relay session over an upgraded WebSocket
pub async fn serve_socket(
    socket: WebSocket,
    ctx: SessionContext,
    hub: Arc<RelayHub>,
    send_queue_capacity: usize,
    send_timeout: Duration,
) -> SessionOutcome {
    let id = ctx.connection_id;
    let (sink, stream) = socket.split();
    let (conn, rx) = ConnectionHandle::channel(id, send_queue_capacity);

    let mut writer = tokio::spawn(writer_task(sink, rx, send_timeout, id));

    let inbound = stream.filter_map(|item| {
        future::ready(match item {
            Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(data)) => Some(Ok(Inbound::Binary(data))),
            // Ping/pong are answered by the transport; close ends the stream
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
            Err(e) => Some(Err(e)),
        })
    });

    let outcome = SessionHandler::new(ctx, hub, conn).run(inbound).await;

    // The handler's handle is gone; the writer finishes once the registry
    // has dropped its clones and any queued close frame is flushed.
    if tokio::time::timeout(send_timeout, &mut writer).await.is_err() {
        tracing::debug!(connection_id = %id, "Writer did not finish, aborting");
        writer.abort();
    }

    outcome
}

/// Forward queued messages to the socket, bounding each write by `send_timeout`
async fn writer_task<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Outbound>,
    send_timeout: Duration,
    id: ConnectionId,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(item) = rx.recv().await {
        let is_close = matches!(item, Outbound::Close { .. });
        let msg = match item {
            Outbound::Binary(data) => Message::Binary(data),
            Outbound::Text(text) => Message::Text(text.as_ref().into()),
            Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })),
        };

        match tokio::time::timeout(send_timeout, sink.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket send failed");
                break;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %id,
                    timeout_ms = send_timeout.as_millis() as u64,
                    "WebSocket send timed out"
                );
                break;
            }
        }

        if is_close {
            break;
        }
    }

    // Dropping the receiver fails every later send to this connection
    drop(rx);
    match tokio::time::timeout(send_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(connection_id = %id, error = %e, "WebSocket close failed");
        }
        Err(_) => {
            tracing::debug!(connection_id = %id, "WebSocket close timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::channel::mpsc as fmpsc;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_writer_forwards_until_close() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel(8);
        tx.send(Outbound::Text(Arc::from("hi"))).await.unwrap();
        tx.send(Outbound::Binary(Bytes::from_static(&[7]))).await.unwrap();
        tx.send(Outbound::Close {
            code: 1008,
            reason: "bye".into(),
        })
        .await
        .unwrap();
        tx.send(Outbound::Text(Arc::from("after close"))).await.unwrap();

        writer_task(sink, rx, TIMEOUT, ConnectionId(1)).await;

        assert_eq!(written.next().await, Some(Message::Text("hi".into())));
        assert_eq!(
            written.next().await,
            Some(Message::Binary(Bytes::from_static(&[7])))
        );
        match written.next().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, 1008);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
        // Sink closed by the writer
        assert_eq!(written.next().await, None);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_writer_finishes_when_socket_is_gone() {
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        let (tx, rx) = mpsc::channel(8);
        tx.send(Outbound::Text(Arc::from("lost"))).await.unwrap();

        let finished =
            tokio::time::timeout(TIMEOUT, writer_task(sink, rx, TIMEOUT, ConnectionId(2))).await;

        assert!(finished.is_ok());
        assert!(tx.is_closed());
    }
}

//! Per-connection WebSocket session: read and write pumps.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::ProbeResult;
use crate::metrics::MetricsCollector;
use tracing::{debug, info, warn};

use super::client::{ClientHandle, SEND_QUEUE_CAPACITY};
use super::filter::{parse_subscription, SharedFilter};

/// Deadline for a single socket write.
const WRITE_WAIT: Duration = Duration::from_secs(30);

/// Read deadline for persistent connections.
const READ_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Ping at 90% of the read deadline (about 21.6 hours).
const PING_PERIOD: Duration = Duration::from_secs(24 * 60 * 60 / 10 * 9);

/// Drive one upgraded WebSocket connection until it terminates.
///
/// The session registers an accept-all client with the hub, then runs the
/// read pump here while the write pump runs on its own task. Whichever
/// pump exits first unregisters the client; the hub then drops the send
/// queue sender, which the other pump observes as terminal.
pub async fn run(
    socket: WebSocket,
    hub: super::HubHandle,
    metrics: Arc<MetricsCollector>,
    cancel: CancellationToken,
) {
    let id = Uuid::new_v4();
    let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
    let filter = SharedFilter::default();

    if hub
        .register(ClientHandle::new(id, send_tx, filter.clone()))
        .await
        .is_err()
    {
        debug!(client_id = %id, "Hub unavailable, rejecting session");
        return;
    }
    info!(client_id = %id, "WebSocket session established");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(
        id,
        sink,
        send_rx,
        hub.clone(),
        metrics,
        cancel.clone(),
    ));

    read_pump(id, stream, filter, cancel).await;

    hub.unregister(id).await;
    let _ = writer.await;
    info!(client_id = %id, "WebSocket session closed");
}

/// Pump queued results onto the socket, pinging on the long timer.
async fn write_pump(
    id: Uuid,
    mut sink: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<ProbeResult>>,
    hub: super::HubHandle,
    metrics: Arc<MetricsCollector>,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + PING_PERIOD, PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                send_close(&mut sink, close_code::AWAY, "server shutting down").await;
                break;
            }
            message = send_rx.recv() => match message {
                Some(result) => {
                    let payload = match serde_json::to_string(&*result) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(client_id = %id, error = %e, "Failed to serialize result");
                            continue;
                        }
                    };
                    match timeout(WRITE_WAIT, sink.send(Message::Text(Utf8Bytes::from(payload)))).await {
                        Ok(Ok(())) => {
                            metrics.increment_ws_message(&result.payer, &result.endpoint_type);
                        }
                        Ok(Err(e)) => {
                            debug!(client_id = %id, error = %e, "Write failed, closing session");
                            send_close(&mut sink, close_code::ERROR, "write failed").await;
                            break;
                        }
                        Err(_) => {
                            warn!(client_id = %id, "Write deadline exceeded, closing session");
                            send_close(&mut sink, close_code::ERROR, "write deadline exceeded").await;
                            break;
                        }
                    }
                }
                None => {
                    // Queue closed by the hub: shutdown, unregister or
                    // slow-consumer eviction.
                    let (code, reason) = if cancel.is_cancelled() {
                        (close_code::AWAY, "server shutting down")
                    } else {
                        (close_code::ERROR, "send queue closed")
                    };
                    send_close(&mut sink, code, reason).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if timeout(WRITE_WAIT, sink.send(Message::Ping(vec![].into()))).await
                    .map_or(true, |r| r.is_err())
                {
                    debug!(client_id = %id, "Ping failed, closing session");
                    send_close(&mut sink, close_code::ERROR, "ping failed").await;
                    break;
                }
            }
        }
    }

    hub.unregister(id).await;
}

/// Pump inbound messages, applying subscription updates to the filter.
async fn read_pump(
    id: Uuid,
    mut stream: SplitStream<WebSocket>,
    filter: SharedFilter,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = timeout(READ_WAIT, stream.next()) => frame,
        };

        let message = match frame {
            Err(_) => {
                debug!(client_id = %id, "Read deadline exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(client_id = %id, error = %e, "Read error");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if let Some(new_filter) = parse_subscription(text.as_str()) {
                    info!(
                        client_id = %id,
                        payers = ?new_filter.payers,
                        types = ?new_filter.types,
                        "Subscription updated"
                    );
                    filter.replace(new_filter);
                }
            }
            Message::Close(_) => {
                debug!(client_id = %id, "Client closed connection");
                return;
            }
            // Pings are answered by the protocol layer; binary is ignored.
            _ => {}
        }
    }
}

async fn send_close(sink: &mut SplitSink<WebSocket, Message>, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    let _ = timeout(WRITE_WAIT, sink.send(Message::Close(Some(frame)))).await;
}

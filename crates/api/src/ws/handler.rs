use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use sculpt_events::{Broadcaster, ProgressEvent};
use tokio::sync::mpsc;

use crate::state::AppState;

/// Pending acknowledgements per connection; extra ones are dropped.
const ACK_BUFFER: usize = 16;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is subscribed to the broadcaster and
/// receives every progress event as a JSON text frame.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Subscribes to the broadcaster.
///   2. Spawns a sender task that forwards events and acknowledgements.
///   3. Answers every inbound text or binary frame with a heartbeat.
///   4. Unsubscribes on disconnect.
async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let mut subscription = broadcaster.subscribe().await;
    let conn_id = subscription.id();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (ack_tx, mut ack_rx) = mpsc::channel::<ProgressEvent>(ACK_BUFFER);

    // Sender task: broadcast events and per-connection acks share the sink.
    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                Some(ack) = ack_rx.recv() => ack,
            };

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(conn_id = %conn_id, error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                return;
            }
        }

        // Subscription ended: the server is shutting down.
        let _ = sink.send(Message::Close(None)).await;
    });

    // Receiver loop: any payload from the client is a liveness probe.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_) | Message::Binary(_)) => {
                if ack_tx.try_send(ProgressEvent::heartbeat()).is_err() {
                    tracing::trace!(conn_id = %conn_id, "Ack dropped");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: unsubscribe and abort sender task.
    broadcaster.unsubscribe(conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

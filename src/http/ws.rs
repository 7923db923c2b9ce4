use super::state::AppState;
use crate::relay::NORMAL_CLOSURE;
use crate::session::{ClientChannel, OutboundMessage};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Close frame received without a status code
const NO_STATUS_RECEIVED: u16 = 1005;

/// Connection dropped without a close frame
const ABNORMAL_CLOSURE: u16 = 1006;

/// GET /ws/asr
/// Upgrade to the streaming recognition socket
pub async fn ws_asr_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("Recognition socket upgrade requested");

    let max_message_size = state
        .transport
        .max_binary_message_bytes
        .max(state.transport.max_text_message_bytes);

    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one client connection through the connection handler
///
/// Inbound frames are handled one at a time, in order. Outbound messages go
/// through a writer task so backend events never wait on the read loop.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let handler = state.handler.clone();
    let idle_timeout = Duration::from_secs(state.transport.idle_timeout_secs);
    let max_text = state.transport.max_text_message_bytes;

    let (sender, mut receiver) = socket.split();
    let (channel, outbound_rx) = ClientChannel::new(connection_id.clone());
    let (close_tx, close_rx) = oneshot::channel::<Option<CloseFrame<'static>>>();
    let mut close_tx = Some(close_tx);

    let writer = tokio::spawn(write_outbound(
        connection_id.clone(),
        sender,
        outbound_rx,
        close_rx,
    ));

    handler.on_connect(channel.clone()).await;

    let (code, reason) = loop {
        let next = match timeout(idle_timeout, receiver.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!(
                    "Connection {} idle for {:?}, closing",
                    connection_id, idle_timeout
                );
                let reason = "idle timeout".to_string();
                if let Some(tx) = close_tx.take() {
                    let _ = tx.send(Some(CloseFrame {
                        code: NORMAL_CLOSURE,
                        reason: reason.clone().into(),
                    }));
                }
                break (NORMAL_CLOSURE, reason);
            }
        };

        match next {
            Some(Ok(Message::Binary(data))) => {
                handler.on_binary_message(&connection_id, &data).await;
            }
            Some(Ok(Message::Text(text))) => {
                if text.len() > max_text {
                    warn!(
                        "Ignoring {} byte text message from {} (limit {})",
                        text.len(),
                        connection_id,
                        max_text
                    );
                    continue;
                }
                handler.on_text_message(&connection_id, &text).await;
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match &frame {
                    Some(frame) => (frame.code, frame.reason.to_string()),
                    None => (NO_STATUS_RECEIVED, String::new()),
                };
                // Echo the frame to complete the closing handshake
                if let Some(tx) = close_tx.take() {
                    let _ = tx.send(frame);
                }
                break (code, reason);
            }
            Some(Ok(_)) => {
                // Ping/Pong is handled automatically by axum
            }
            Some(Err(e)) => {
                handler.on_transport_error(&connection_id, &e);
                break (ABNORMAL_CLOSURE, e.to_string());
            }
            None => break (ABNORMAL_CLOSURE, String::new()),
        }
    };

    channel.close();
    handler.on_close(&connection_id, code, &reason).await;

    // Lets the writer exit if it is not already sending a close frame
    drop(close_tx);
    if let Err(e) = writer.await {
        error!("Writer task for {} panicked: {}", connection_id, e);
    }
}

/// Serialize outbound messages as JSON text frames until told to close
async fn write_outbound(
    connection_id: String,
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut close_rx: oneshot::Receiver<Option<CloseFrame<'static>>>,
) {
    loop {
        tokio::select! {
            message = outbound_rx.recv() => {
                let Some(message) = message else {
                    break;
                };
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json)).await {
                    warn!("Failed to push result to {}: {}", connection_id, e);
                    break;
                }
            }
            frame = &mut close_rx => {
                if let Ok(frame) = frame {
                    let _ = sender.send(Message::Close(frame)).await;
                }
                break;
            }
        }
    }

    debug!("Writer task for {} finished", connection_id);
}

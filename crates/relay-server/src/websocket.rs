//! WebSocket upgrade and the per-connection pump pair.
//!
//! Each connection runs two loops: the inbound pump (on the handler
//! task) decodes frames into [`Message`]s and posts them to the hub's
//! broadcast channel; the outbound pump (spawned) drains the client's
//! queue onto the socket and keeps the connection alive with pings.
//! Registration completes before either pump starts, so no broadcast can
//! race past an unregistered client.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_core::{is_supported_image_type, Message};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::server::AppState;

/// Display name used when the upgrade request does not supply one.
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    username: Option<String>,
}

/// Wire record sent by clients.
///
/// Non-empty `imagen_data` routes the record through attachment
/// handling; any sender field in the payload is ignored for trust
/// reasons — the display name always comes from the connection.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    message_content: Option<String>,
    #[serde(default)]
    imagen_data: Option<String>,
    #[serde(default)]
    imagen_type: Option<String>,
}

/// Timing knobs the outbound pump needs, lifted out of [`crate::ServerConfig`].
#[derive(Clone, Copy)]
struct PumpTiming {
    ping_interval: Duration,
    pong_timeout: Duration,
    write_timeout: Duration,
}

/// `GET /ws?username=NAME` — upgrade and hand off to the pump pair.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let username = params
        .username
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string());
    ws.max_message_size(state.config.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, username, state))
}

/// Drive one connection from registration through teardown.
async fn handle_socket(socket: WebSocket, username: String, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();

    let (queue_tx, queue_rx) = mpsc::channel(state.config.outbound_queue_capacity);
    let client = Arc::new(Client::new(username, state.hub.handle(), queue_tx));
    info!(client_id = %client.id, username = %client.username, "client connected");

    // Register before the pumps start. If the hub is gone the connection
    // is useless; drop it here.
    if state.hub.handle().register(Arc::clone(&client)).await.is_err() {
        warn!(client_id = %client.id, "hub unavailable, dropping connection");
        return;
    }

    let timing = PumpTiming {
        ping_interval: state.config.ping_interval(),
        pong_timeout: state.config.pong_timeout(),
        write_timeout: state.config.write_timeout(),
    };
    let outbound = tokio::spawn(outbound_pump(ws_tx, queue_rx, Arc::clone(&client), timing));

    inbound_pump(ws_rx, Arc::clone(&client), timing.pong_timeout).await;

    // Unconditional cleanup: unregistering closes the outbound queue,
    // which lets the outbound pump send its Close frame and finish.
    let _ = client.hub().unregister(Arc::clone(&client)).await;
    let _ = outbound.await;
    info!(client_id = %client.id, username = %client.username, "client disconnected");
}

/// Read loop: decode frames, validate attachments, post to the hub.
///
/// Every read carries a deadline of the pong window. A live peer answers
/// keepalive pings and those pongs arrive here, so the deadline only
/// expires for a peer that has gone completely silent. That connection
/// is torn down rather than parked forever.
async fn inbound_pump(
    mut ws_rx: SplitStream<WebSocket>,
    client: Arc<Client>,
    read_timeout: Duration,
) {
    loop {
        let frame = match tokio::time::timeout(read_timeout, ws_rx.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                warn!(client_id = %client.id, error = %e, "read failed, closing");
                break;
            }
            Ok(None) => {
                debug!(client_id = %client.id, "stream ended");
                break;
            }
            Err(_) => {
                warn!(client_id = %client.id, "no frames within the pong window, closing");
                break;
            }
        };
        let text = match frame {
            WsMessage::Text(t) => t.to_string(),
            WsMessage::Binary(b) => match String::from_utf8(b.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(client_id = %client.id, "non-UTF8 binary frame skipped");
                    continue;
                }
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                client.mark_alive();
                continue;
            }
            WsMessage::Close(_) => {
                debug!(client_id = %client.id, "peer sent close frame");
                break;
            }
        };
        client.mark_alive();

        let frame: InboundFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(client_id = %client.id, error = %e, "malformed frame skipped");
                continue;
            }
        };

        let Some(message) = build_message(&client.username, frame) else {
            continue;
        };

        if client.hub().broadcast(message).await.is_err() {
            // Hub shut down; nothing more this connection can do.
            break;
        }
    }
}

/// Turn an inbound record into a [`Message`], or reject it.
///
/// Rejections (missing content, missing or unsupported media type) are
/// logged and skipped; the connection stays open.
fn build_message(sender: &str, frame: InboundFrame) -> Option<Message> {
    match frame.imagen_data {
        Some(data) if !data.is_empty() => {
            let Some(media_type) = frame.imagen_type else {
                warn!(username = %sender, "attachment without media type skipped");
                return None;
            };
            if !is_supported_image_type(&media_type) {
                warn!(username = %sender, media_type = %media_type, "unsupported attachment type skipped");
                return None;
            }
            Some(Message::with_image(
                sender,
                frame.message_content.unwrap_or_default(),
                data,
                media_type,
            ))
        }
        _ => {
            let Some(content) = frame.message_content else {
                warn!(username = %sender, "frame without message_content skipped");
                return None;
            };
            Some(Message::user(sender, content))
        }
    }
}

/// Write loop: drain the outbound queue, ping periodically, enforce
/// write deadlines and the pong window.
async fn outbound_pump(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut queue: mpsc::Receiver<Arc<Message>>,
    client: Arc<Client>,
    timing: PumpTiming,
) {
    let mut ping = tokio::time::interval(timing.ping_interval);
    // Consume the immediate first tick.
    ping.tick().await;

    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(message) => {
                    let json = match serde_json::to_string(&*message) {
                        Ok(j) => j,
                        Err(e) => {
                            warn!(client_id = %client.id, error = %e, "failed to serialize message");
                            continue;
                        }
                    };
                    let write = ws_tx.send(WsMessage::Text(json.into()));
                    match tokio::time::timeout(timing.write_timeout, write).await {
                        Ok(Ok(())) => {}
                        _ => {
                            warn!(client_id = %client.id, "write failed or timed out");
                            break;
                        }
                    }
                }
                None => {
                    // Queue closed by the hub: say goodbye and stop.
                    debug!(client_id = %client.id, "outbound queue closed");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if client.last_pong_elapsed() > timing.pong_timeout {
                    warn!(client_id = %client.id, "peer unresponsive, closing");
                    break;
                }
                let probe = ws_tx.send(WsMessage::Ping(Vec::new().into()));
                if !matches!(tokio::time::timeout(timing.write_timeout, probe).await, Ok(Ok(()))) {
                    warn!(client_id = %client.id, "keepalive write failed");
                    break;
                }
            }
        }
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use murmur_types::events::GatewayCommand;

use crate::Gateway;
use crate::presence::ConnectionHandle;
use crate::session::{ConnectionSession, DisconnectReason};

/// Server sends a Ping this often. Two intervals without a Pong drop the
/// connection (~50s).
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Drive one WebSocket connection until it closes.
///
/// A writer task drains the connection's outbound queue and runs the
/// heartbeat; this task reads frames and feeds them to the session state
/// machine in arrival order.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbound_rx) = ConnectionHandle::new();
    let conn_id = handle.id();

    info!(
        "Connection {} opened ({} users online)",
        conn_id,
        gateway.presence.online_count().await
    );

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound_rx.recv() => {
                    let Some(event) = event else {
                        return DisconnectReason::ClientClosed;
                    };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        return DisconnectReason::TransportError;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            return DisconnectReason::HeartbeatTimeout;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        return DisconnectReason::TransportError;
                    }
                }
            }
        }
    });

    let mut session = ConnectionSession::new(gateway, handle);

    let reason = loop {
        tokio::select! {
            finished = &mut send_task => {
                break finished.unwrap_or(DisconnectReason::TransportError);
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => session.handle_command(cmd).await,
                        Err(e) => {
                            warn!(
                                "Connection {} bad command: {} -- raw: {}",
                                conn_id,
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                        }
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    pong_received.store(true, Ordering::Release);
                }
                Some(Ok(Message::Close(_))) | None => break DisconnectReason::ClientClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection {} read error: {}", conn_id, e);
                    break DisconnectReason::TransportError;
                }
            }
        }
    };

    send_task.abort();
    let presence = session.gateway().presence.clone();
    session.disconnect(reason).await;
    info!(
        "Connection {} closed ({:?}, {} users online)",
        conn_id,
        reason,
        presence.online_count().await
    );
}

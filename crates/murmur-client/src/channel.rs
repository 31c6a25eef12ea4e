use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::config::ClientConfig;

/// Lifecycle and traffic reported by a channel driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// First successful connection
    Connected,
    /// Transport came back after a drop; carries the retry attempt that succeeded
    Reconnected(u32),
    /// Transport lost; the driver is about to retry
    Dropped(String),
    Inbound(GatewayEvent),
    /// A command the driver accepted but never wrote to a live socket
    Undelivered(GatewayCommand),
    /// Retries exhausted; the driver has stopped
    GaveUp,
    /// Closed on request; the driver has stopped
    Closed,
}

/// Instructions from the session to its channel driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    Emit(GatewayCommand),
    Close,
}

/// Session side of an open channel.
#[derive(Debug)]
pub struct Channel {
    pub commands: mpsc::UnboundedSender<ChannelCommand>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Driver side of an open channel.
#[derive(Debug)]
pub struct ChannelEnd {
    pub commands: mpsc::UnboundedReceiver<ChannelCommand>,
    pub events: mpsc::UnboundedSender<ChannelEvent>,
}

impl Channel {
    /// Connected pair of queues. A connector hands the `Channel` to the
    /// session and drives the `ChannelEnd` itself.
    pub fn pair() -> (Channel, ChannelEnd) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Channel {
                commands: cmd_tx,
                events: event_rx,
            },
            ChannelEnd {
                commands: cmd_rx,
                events: event_tx,
            },
        )
    }
}

/// Opens channels to the gateway. Each call must return a fresh channel
/// whose driver owns reconnection for that channel's lifetime.
pub trait Connector: Send + Sync + 'static {
    fn open(&self) -> Channel;
}

/// WebSocket connector with bounded, fixed-delay reconnection.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    max_attempts: u32,
    delay: Duration,
}

impl WsConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            url: config.gateway_url(),
            max_attempts: config.reconnect_attempts,
            delay: config.reconnect_delay,
        }
    }

    pub fn with_retry(url: impl Into<String>, max_attempts: u32, delay: Duration) -> Self {
        Self {
            url: url.into(),
            max_attempts,
            delay,
        }
    }
}

impl Connector for WsConnector {
    fn open(&self) -> Channel {
        let (channel, end) = Channel::pair();
        tokio::spawn(drive(self.clone(), end));
        channel
    }
}

enum SocketEnd {
    /// Close requested or the session went away
    Closed,
    Dropped(String),
}

async fn drive(cfg: WsConnector, mut end: ChannelEnd) {
    let mut connected_once = false;
    let mut attempt: u32 = 0;

    loop {
        match connect_async(cfg.url.as_str()).await {
            Ok((ws, _)) => {
                let event = if connected_once {
                    info!("Reconnected to {} after {} attempt(s)", cfg.url, attempt);
                    ChannelEvent::Reconnected(attempt)
                } else {
                    info!("Connected to {}", cfg.url);
                    ChannelEvent::Connected
                };
                connected_once = true;
                attempt = 0;
                let _ = end.events.send(event);

                match run_socket(ws, &mut end).await {
                    SocketEnd::Closed => {
                        let _ = end.events.send(ChannelEvent::Closed);
                        return;
                    }
                    SocketEnd::Dropped(reason) => {
                        warn!("Connection to {} dropped: {}", cfg.url, reason);
                        let _ = end.events.send(ChannelEvent::Dropped(reason));
                    }
                }
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", cfg.url, e);
                let _ = end.events.send(ChannelEvent::Dropped(e.to_string()));
            }
        }

        attempt += 1;
        if attempt > cfg.max_attempts {
            warn!("Giving up on {} after {} attempts", cfg.url, cfg.max_attempts);
            while let Ok(ChannelCommand::Emit(cmd)) = end.commands.try_recv() {
                let _ = end.events.send(ChannelEvent::Undelivered(cmd));
            }
            let _ = end.events.send(ChannelEvent::GaveUp);
            return;
        }

        if !wait_before_retry(cfg.delay, &mut end).await {
            let _ = end.events.send(ChannelEvent::Closed);
            return;
        }
    }
}

/// Sleep out the retry delay. Returns false if a close arrived meanwhile.
/// Emits while disconnected are handed back as undelivered.
async fn wait_before_retry(delay: Duration, end: &mut ChannelEnd) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = end.commands.recv() => match cmd {
                Some(ChannelCommand::Emit(cmd)) => {
                    debug!("Returning {} undelivered while disconnected", cmd.name());
                    let _ = end.events.send(ChannelEvent::Undelivered(cmd));
                }
                Some(ChannelCommand::Close) | None => return false,
            }
        }
    }
}

async fn run_socket(ws: WebSocketStream<MaybeTlsStream<TcpStream>>, end: &mut ChannelEnd) -> SocketEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            cmd = end.commands.recv() => match cmd {
                Some(ChannelCommand::Emit(cmd)) => {
                    let text = match serde_json::to_string(&cmd) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize {}: {}", cmd.name(), e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                        let _ = end.events.send(ChannelEvent::Undelivered(cmd));
                        return SocketEnd::Dropped(e.to_string());
                    }
                }
                Some(ChannelCommand::Close) | None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return SocketEnd::Closed;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<GatewayEvent>(&text) {
                        Ok(event) => {
                            let _ = end.events.send(ChannelEvent::Inbound(event));
                        }
                        Err(e) => warn!("Ignoring unreadable event: {}", e),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return SocketEnd::Dropped("server closed the connection".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SocketEnd::Dropped(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_gives_up_after_bounded_attempts() {
        // Grab a free port, then release it so nothing is listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector =
            WsConnector::with_retry(format!("ws://{}/gateway", addr), 2, Duration::from_millis(10));
        let mut channel = connector.open();

        let mut events = Vec::new();
        while let Some(event) = channel.events.recv().await {
            events.push(event);
        }

        let drops = events
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Dropped(_)))
            .count();
        assert_eq!(drops, 3);
        assert_eq!(events.last(), Some(&ChannelEvent::GaveUp));
    }

    #[tokio::test]
    async fn close_during_retry_wait_stops_the_driver() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector =
            WsConnector::with_retry(format!("ws://{}/gateway", addr), 5, Duration::from_secs(30));
        let mut channel = connector.open();

        assert!(matches!(channel.events.recv().await, Some(ChannelEvent::Dropped(_))));
        channel.commands.send(ChannelCommand::Close).unwrap();
        assert_eq!(channel.events.recv().await, Some(ChannelEvent::Closed));
        assert_eq!(channel.events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_during_retry_wait_come_back_undelivered() {
        let (channel, mut end) = Channel::pair();
        let Channel { commands, mut events } = channel;

        let send = GatewayCommand::SendMessage {
            receiver_id: "bob".into(),
            content: "in the gap".into(),
            sender_id: None,
        };
        commands.send(ChannelCommand::Emit(send.clone())).unwrap();

        assert!(wait_before_retry(Duration::from_millis(100), &mut end).await);
        assert_eq!(events.try_recv().unwrap(), ChannelEvent::Undelivered(send));
        assert!(events.try_recv().is_err());
    }
}

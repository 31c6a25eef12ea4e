use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use murmur_types::UserId;
use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::channel::{ChannelCommand, ChannelEvent, Connector};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::rest::MessageApi;

const INBOUND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    ReconnectPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session is already connecting or connected; nothing was opened
    AlreadyActive,
}

struct Shared {
    user: UserId,
    state: watch::Sender<SessionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ChannelCommand>>>,
    active_conversation: Mutex<Option<UserId>>,
    unread: AtomicU64,
    inbound: broadcast::Sender<GatewayEvent>,
    undelivered: broadcast::Sender<GatewayCommand>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Session {}: {:?} -> {:?}", self.user, previous, state);
        }
    }

    fn push(&self, cmd: GatewayCommand) -> bool {
        match self.outbound.lock() {
            Ok(guard) => guard
                .as_ref()
                .is_some_and(|tx| tx.send(ChannelCommand::Emit(cmd)).is_ok()),
            Err(_) => false,
        }
    }

    fn take_outbound(&self) -> Option<mpsc::UnboundedSender<ChannelCommand>> {
        self.outbound.lock().ok().and_then(|mut guard| guard.take())
    }

    fn active_conversation(&self) -> Option<UserId> {
        self.active_conversation
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

/// Cloneable view of the live channel, handed to the view model and any
/// other component that needs to emit or observe events.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    pub fn user(&self) -> &UserId {
        &self.shared.user
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.state.borrow() == SessionState::Connected
    }

    /// Queue a command on the live channel. False when not connected; the
    /// caller decides whether to fall back to REST.
    pub fn emit(&self, cmd: GatewayCommand) -> bool {
        self.is_connected() && self.shared.push(cmd)
    }

    /// Inbound gateway events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.shared.inbound.subscribe()
    }

    /// Commands that `emit` accepted but the channel dropped before they
    /// reached the server.
    pub fn subscribe_undelivered(&self) -> broadcast::Receiver<GatewayCommand> {
        self.shared.undelivered.subscribe()
    }

    /// Messages from the open conversation don't count towards unread.
    pub fn set_active_conversation(&self, counterparty: Option<UserId>) {
        if let Ok(mut guard) = self.shared.active_conversation.lock() {
            *guard = counterparty;
        }
    }

    pub fn unread_count(&self) -> u64 {
        self.shared.unread.load(Ordering::Acquire)
    }

    /// Replace the counter with an authoritative total from REST.
    pub fn set_unread_count(&self, total: u64) {
        self.shared.unread.store(total, Ordering::Release);
    }
}

/// Owns one user's live channel: opens it, re-authenticates after every
/// (re)connect, tracks the unread badge, and closes it on logout.
pub struct SessionController<C: Connector, A: MessageApi> {
    shared: Arc<Shared>,
    connector: C,
    api: Arc<A>,
    token: String,
    pump: Option<JoinHandle<()>>,
}

impl<C: Connector, A: MessageApi> SessionController<C, A> {
    pub fn new(config: &ClientConfig, connector: C, api: Arc<A>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (inbound, _) = broadcast::channel(INBOUND_BUFFER);
        let (undelivered, _) = broadcast::channel(INBOUND_BUFFER);

        Self {
            shared: Arc::new(Shared {
                user: config.user_id.clone(),
                state,
                outbound: Mutex::new(None),
                active_conversation: Mutex::new(None),
                unread: AtomicU64::new(0),
                inbound,
                undelivered,
            }),
            connector,
            api,
            token: config.token.clone(),
            pump: None,
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Open the channel unless a session is already underway.
    pub async fn start(&mut self) -> StartOutcome {
        if self.state() != SessionState::Idle {
            debug!("Session for {} already active, not opening another channel", self.shared.user);
            return StartOutcome::AlreadyActive;
        }

        self.shared.set_state(SessionState::Connecting);
        let channel = self.connector.open();

        if let Ok(mut guard) = self.shared.outbound.lock() {
            *guard = Some(channel.commands);
        }

        let authenticate = GatewayCommand::Authenticate {
            user_id: self.shared.user.to_string(),
            token: self.token.clone(),
        };
        self.pump = Some(tokio::spawn(pump(
            self.shared.clone(),
            channel.events,
            authenticate,
        )));

        if let Err(e) = self.refresh_unread().await {
            warn!("Could not load unread count for {}: {}", self.shared.user, e);
        }

        StartOutcome::Started
    }

    /// Close the channel and reset all session state.
    pub fn logout(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(tx) = self.shared.take_outbound() {
            let _ = tx.send(ChannelCommand::Close);
        }

        self.shared.unread.store(0, Ordering::Release);
        self.handle().set_active_conversation(None);
        self.shared.set_state(SessionState::Idle);
        info!("{} logged out", self.shared.user);
    }

    /// Replace the unread counter with the server's total.
    pub async fn refresh_unread(&self) -> Result<u64, ClientError> {
        let total = self.api.unread_total().await?;
        self.handle().set_unread_count(total);
        Ok(total)
    }

    pub fn start_typing(&self, counterparty: &UserId) -> bool {
        self.handle().emit(GatewayCommand::TypingStart {
            receiver_id: counterparty.to_string(),
        })
    }

    pub fn stop_typing(&self, counterparty: &UserId) -> bool {
        self.handle().emit(GatewayCommand::TypingStop {
            receiver_id: counterparty.to_string(),
        })
    }
}

impl<C: Connector, A: MessageApi> Drop for SessionController<C, A> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(tx) = self.shared.take_outbound() {
            let _ = tx.send(ChannelCommand::Close);
        }
    }
}

/// Consume channel lifecycle events for one session.
async fn pump(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    authenticate: GatewayCommand,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Connected | ChannelEvent::Reconnected(_) => {
                if let ChannelEvent::Reconnected(attempt) = event {
                    info!("{} reconnected on attempt {}, re-authenticating", shared.user, attempt);
                }
                shared.set_state(SessionState::Connected);
                if !shared.push(authenticate.clone()) {
                    warn!("Could not queue authenticate for {}", shared.user);
                }
            }

            ChannelEvent::Dropped(reason) => {
                debug!("{} channel dropped: {}", shared.user, reason);
                shared.set_state(SessionState::ReconnectPending);
            }

            ChannelEvent::Inbound(event) => {
                if let GatewayEvent::ReceiveMessage(message) = &event {
                    let open = shared.active_conversation();
                    if open.as_ref() != Some(&message.sender_id) {
                        shared.unread.fetch_add(1, Ordering::AcqRel);
                    }
                }
                if let GatewayEvent::AuthError { error } = &event {
                    warn!("Gateway refused {}: {}", shared.user, error);
                }
                // No subscribers is fine
                let _ = shared.inbound.send(event);
            }

            ChannelEvent::Undelivered(cmd) => {
                debug!("{} not delivered for {}", cmd.name(), shared.user);
                let _ = shared.undelivered.send(cmd);
            }

            ChannelEvent::GaveUp => {
                warn!("{} gave up reconnecting", shared.user);
                shared.take_outbound();
                shared.set_state(SessionState::Idle);
                return;
            }

            ChannelEvent::Closed => {
                shared.take_outbound();
                shared.set_state(SessionState::Idle);
                return;
            }
        }
    }

    // Driver vanished without saying goodbye
    shared.take_outbound();
    shared.set_state(SessionState::Idle);
}

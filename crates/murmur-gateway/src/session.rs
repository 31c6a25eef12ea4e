use tracing::{debug, info, warn};

use murmur_db::StoreError;
use murmur_types::UserId;
use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::Gateway;
use crate::auth::verify_token;
use crate::presence::ConnectionHandle;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Close frame or orderly end of stream from the client
    ClientClosed,
    /// Socket read/write failed
    TransportError,
    /// Client stopped answering pings
    HeartbeatTimeout,
}

impl DisconnectReason {
    /// Transport-level drops are followed by a client reconnect, so the
    /// presence entry is left for that reconnect to overwrite.
    pub fn expects_reconnect(self) -> bool {
        matches!(self, Self::TransportError | Self::HeartbeatTimeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated(UserId),
}

/// Per-connection state machine. Commands are handled one at a time in
/// arrival order; every outcome is reported on this connection or routed
/// through the presence registry.
pub struct ConnectionSession {
    gateway: Gateway,
    handle: ConnectionHandle,
    state: ConnectionState,
}

impl ConnectionSession {
    pub fn new(gateway: Gateway, handle: ConnectionHandle) -> Self {
        Self {
            gateway,
            handle,
            state: ConnectionState::Unauthenticated,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn user(&self) -> Option<&UserId> {
        match &self.state {
            ConnectionState::Authenticated(user) => Some(user),
            ConnectionState::Unauthenticated => None,
        }
    }

    pub async fn handle_command(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Authenticate { user_id, token } => {
                self.authenticate(&user_id, &token).await;
            }

            GatewayCommand::SendMessage {
                receiver_id,
                content,
                sender_id,
            } => {
                self.send_message(&receiver_id, &content, sender_id.as_deref())
                    .await;
            }

            GatewayCommand::TypingStart { receiver_id } => {
                if let Some(me) = self.user() {
                    let event = GatewayEvent::UserTyping { user_id: me.clone() };
                    self.relay_typing(&receiver_id, event).await;
                }
            }

            GatewayCommand::TypingStop { receiver_id } => {
                if let Some(me) = self.user() {
                    let event = GatewayEvent::UserStoppedTyping { user_id: me.clone() };
                    self.relay_typing(&receiver_id, event).await;
                }
            }
        }
    }

    /// Release the presence entry unless the client is expected back.
    pub async fn disconnect(self, reason: DisconnectReason) {
        let conn_id = self.handle.id();
        match &self.state {
            ConnectionState::Authenticated(user) if reason.expects_reconnect() => {
                info!(
                    "{} dropped ({:?}) on connection {}, awaiting reconnect",
                    user, reason, conn_id
                );
            }
            ConnectionState::Authenticated(user) => {
                if self.gateway.presence.deauthenticate(&self.handle).await {
                    info!("{} disconnected from gateway", user);
                } else {
                    debug!("{} closed superseded connection {}", user, conn_id);
                }
            }
            ConnectionState::Unauthenticated => {
                debug!("Unauthenticated connection {} closed ({:?})", conn_id, reason);
            }
        }
    }

    async fn authenticate(&mut self, user_id: &str, token: &str) {
        let user = match UserId::parse(user_id) {
            Ok(user) => user,
            Err(e) => {
                warn!("Connection {} sent bad user id: {}", self.handle.id(), e);
                self.refuse_auth(format!("Invalid user ID format: {}", e));
                return;
            }
        };

        let subject = match verify_token(self.gateway.jwt_secret(), token) {
            Ok(claims) => claims.sub,
            Err(e) => {
                warn!("Connection {} failed to authenticate as {}: {}", self.handle.id(), user, e);
                self.refuse_auth("Invalid or expired token".into());
                return;
            }
        };

        if subject != user.as_str() {
            warn!(
                "Connection {} presented a token for {} while claiming {}",
                self.handle.id(),
                subject,
                user
            );
            self.refuse_auth("Token does not match user".into());
            return;
        }

        self.gateway
            .presence
            .authenticate(user.clone(), self.handle.clone())
            .await;
        info!("User {} authenticated on connection {}", user, self.handle.id());

        self.state = ConnectionState::Authenticated(user.clone());
        self.reply(GatewayEvent::Authenticated { user_id: user });
    }

    fn refuse_auth(&self, error: String) {
        if let ConnectionState::Authenticated(current) = &self.state {
            debug!(
                "Connection {} keeps its binding to {} after a failed authenticate",
                self.handle.id(),
                current
            );
        }
        self.reply(GatewayEvent::AuthError { error });
    }

    async fn send_message(&mut self, receiver_id: &str, content: &str, claimed: Option<&str>) {
        let Some(me) = self.user().cloned() else {
            self.reply(GatewayEvent::MessageError {
                error: "Not authenticated".into(),
            });
            return;
        };

        if claimed.is_some_and(|sender| sender != me.as_str()) {
            warn!("{} tried to send as {:?}", me, claimed);
            self.reply(GatewayEvent::MessageError {
                error: "Sender does not match authenticated user".into(),
            });
            return;
        }

        let message = match self.gateway.store.send(me.as_str(), receiver_id, content).await {
            Ok(message) => message,
            Err(StoreError::Validation(reason)) => {
                debug!("{} send rejected: {}", me, reason);
                self.reply(GatewayEvent::MessageError { error: reason });
                return;
            }
            Err(e) => {
                warn!("{} send failed: {}", me, e);
                self.reply(GatewayEvent::MessageError {
                    error: "Failed to send message".into(),
                });
                return;
            }
        };

        let delivered = self
            .gateway
            .presence
            .send_to_user(&message.receiver_id, GatewayEvent::ReceiveMessage(message.clone()))
            .await;
        debug!(
            "{} -> {} message {} ({})",
            me,
            message.receiver_id,
            message.id,
            if delivered { "live" } else { "stored" }
        );

        self.reply(GatewayEvent::MessageSent(message));
    }

    async fn relay_typing(&self, receiver_id: &str, event: GatewayEvent) {
        // Fire-and-forget: absent or malformed receivers are simply dropped
        let Ok(receiver) = UserId::parse(receiver_id) else {
            return;
        };
        self.gateway.presence.send_to_user(&receiver, event).await;
    }

    fn reply(&self, event: GatewayEvent) {
        if !self.handle.send(event) {
            debug!("Connection {} writer gone, reply dropped", self.handle.id());
        }
    }
}

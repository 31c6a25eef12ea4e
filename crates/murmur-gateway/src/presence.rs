use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use murmur_types::UserId;
use murmur_types::events::GatewayEvent;

/// Outbound side of one live connection: an id plus the queue its writer
/// task drains. Two handles are equal when they name the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// New handle and the receiver its writer task should drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event. False once the connection's writer is gone.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Process-wide map of authenticated users to their live connection.
///
/// One entry per user, last registration wins. In-memory only: a restart
/// forgets everyone and clients re-authenticate when they reconnect.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<Registry>>,
}

#[derive(Default)]
struct Registry {
    /// user -> the connection that currently receives their events
    users: HashMap<UserId, ConnectionHandle>,

    /// connection id -> the user it authenticated as
    bindings: HashMap<Uuid, UserId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `user`, replacing any earlier connection for that
    /// user. Repeating the same pair is harmless.
    pub async fn authenticate(&self, user: UserId, handle: ConnectionHandle) {
        let mut reg = self.inner.write().await;

        // A connection re-authenticating as someone else releases its old user
        if let Some(previous) = reg.bindings.insert(handle.id, user.clone()) {
            if previous != user && reg.users.get(&previous).is_some_and(|h| h.id == handle.id) {
                reg.users.remove(&previous);
            }
        }

        let conn_id = handle.id;
        if let Some(replaced) = reg.users.insert(user.clone(), handle) {
            if replaced.id != conn_id {
                debug!(
                    "{} moved from connection {} to {}",
                    user, replaced.id, conn_id
                );
                reg.bindings.remove(&replaced.id);
            }
        }
    }

    pub async fn lookup(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.users.get(user).cloned()
    }

    /// Drop the mapping owned by `handle`. A no-op when a newer connection
    /// has since taken over the user. Returns whether anything was removed.
    pub async fn deauthenticate(&self, handle: &ConnectionHandle) -> bool {
        let mut reg = self.inner.write().await;

        let Some(user) = reg.bindings.remove(&handle.id) else {
            return false;
        };

        // Only clean up if this connection still owns the user
        if reg.users.get(&user).is_some_and(|h| h.id == handle.id) {
            reg.users.remove(&user);
            true
        } else {
            false
        }
    }

    /// Push an event to the user's live connection.
    ///
    /// Returns false when the user is absent. An entry whose connection has
    /// already gone away is pruned here, which is how entries left behind by
    /// transport drops eventually disappear.
    pub async fn send_to_user(&self, user: &UserId, event: GatewayEvent) -> bool {
        let Some(handle) = self.lookup(user).await else {
            return false;
        };

        if handle.send(event) {
            return true;
        }

        if self.deauthenticate(&handle).await {
            debug!("Pruned stale connection {} for {}", handle.id, user);
        }
        false
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.users.len()
    }
}

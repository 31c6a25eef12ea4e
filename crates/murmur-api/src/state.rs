use std::sync::Arc;

use murmur_db::MessageStore;
use murmur_gateway::Gateway;
use murmur_gateway::presence::PresenceRegistry;

pub type AppState = Arc<AppStateInner>;

/// Shared by every REST handler. The store and presence registry are the
/// same instances the gateway's connections use, so a REST send can reach
/// a live receiver.
pub struct AppStateInner {
    pub store: MessageStore,
    pub presence: PresenceRegistry,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(gateway: &Gateway) -> AppState {
        Arc::new(Self {
            store: gateway.store.clone(),
            presence: gateway.presence.clone(),
            jwt_secret: gateway.jwt_secret().to_string(),
        })
    }
}

pub mod auth;
pub mod connection;
pub mod presence;
pub mod session;

use std::sync::Arc;

use murmur_db::MessageStore;

use crate::presence::PresenceRegistry;

/// Everything a connection handler needs, passed explicitly to each one.
#[derive(Clone)]
pub struct Gateway {
    pub presence: PresenceRegistry,
    pub store: MessageStore,
    jwt_secret: Arc<str>,
}

impl Gateway {
    pub fn new(store: MessageStore, jwt_secret: &str) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            store,
            jwt_secret: Arc::from(jwt_secret),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }
}

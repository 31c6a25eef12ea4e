//! Client side of murmur: a session controller that owns the live channel,
//! a REST client for catch-up and durable sends, and a conversation view
//! model that merges both into one consistent picture.

pub mod channel;
pub mod config;
pub mod error;
pub mod rest;
pub mod session;
pub mod typing;
pub mod view;

pub use channel::{Channel, ChannelCommand, ChannelEnd, ChannelEvent, Connector, WsConnector};
pub use config::ClientConfig;
pub use error::ClientError;
pub use rest::{MessageApi, RestClient};
pub use session::{ChannelHandle, SessionController, SessionState, StartOutcome};
pub use typing::{TypingNotifier, TypingTracker};
pub use view::{ConversationView, DeliveryStatus, ThreadEntry};

pub mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use murmur_api::messages;
use murmur_api::middleware::require_auth;
use murmur_api::state::AppStateInner;
use murmur_db::{Database, MessageStore};
use murmur_gateway::{Gateway, connection};

pub use config::{ConfigError, ServerConfig};

/// Wire up the store, gateway and REST state around one database.
pub fn build_gateway(db: Database, jwt_secret: &str) -> Gateway {
    Gateway::new(MessageStore::new(Arc::new(db)), jwt_secret)
}

/// Full HTTP surface: REST under `/messages`, WebSocket on `/gateway`.
pub fn router(gateway: Gateway) -> Router {
    let app_state = AppStateInner::new(&gateway);

    let protected_routes = Router::new()
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route("/messages/read", post(messages::mark_read))
        .route("/messages/delete", delete(messages::delete_conversation))
        .route("/messages/unread", get(messages::unread))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_upgrade(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}

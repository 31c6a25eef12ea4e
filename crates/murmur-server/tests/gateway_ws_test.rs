use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use murmur_db::Database;
use murmur_gateway::auth::issue_token;
use murmur_server::{build_gateway, router};

const SECRET: &str = "ws-test-secret";

async fn spawn_server() -> String {
    let gateway = build_gateway(Database::open_in_memory().unwrap(), SECRET);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(gateway)).await.unwrap();
    });
    format!("ws://{}/gateway", addr)
}

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn login(url: &str, user: &str) -> Ws {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let token = issue_token(SECRET, user, chrono::Duration::minutes(5)).unwrap();
    send(&mut ws, json!({ "type": "authenticate", "data": { "userId": user, "token": token } })).await;
    let ack = recv(&mut ws).await;
    assert_eq!(ack, json!({ "type": "authenticated", "data": { "userId": user } }));
    ws
}

#[tokio::test]
async fn wire_format_round_trip() {
    let url = spawn_server().await;
    let mut alice = login(&url, "alice").await;
    let mut bob = login(&url, "bob").await;

    // garbage is ignored, the connection survives
    alice.send(Message::Text("not json".into())).await.unwrap();
    send(&mut alice, json!({ "type": "no_such_event", "data": {} })).await;

    send(&mut alice, json!({ "type": "typing_start", "data": { "receiverId": "bob" } })).await;
    assert_eq!(
        recv(&mut bob).await,
        json!({ "type": "user_typing", "data": { "userId": "alice" } })
    );

    send(
        &mut alice,
        json!({ "type": "send_message", "data": { "receiverId": "bob", "content": "hi" } }),
    )
    .await;

    let received = recv(&mut bob).await;
    assert_eq!(received["type"], "receive_message");
    assert_eq!(received["data"]["senderId"], "alice");
    assert_eq!(received["data"]["content"], "hi");
    assert_eq!(received["data"]["isRead"], false);

    let sent = recv(&mut alice).await;
    assert_eq!(sent["type"], "message_sent");
    assert_eq!(sent["data"]["id"], received["data"]["id"]);
}

#[tokio::test]
async fn unauthenticated_send_gets_message_error() {
    let url = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    send(
        &mut ws,
        json!({ "type": "send_message", "data": { "receiverId": "bob", "content": "hi" } }),
    )
    .await;
    assert_eq!(
        recv(&mut ws).await,
        json!({ "type": "message_error", "data": { "error": "Not authenticated" } })
    );

    send(&mut ws, json!({ "type": "authenticate", "data": { "userId": "bob", "token": "junk" } })).await;
    assert_eq!(
        recv(&mut ws).await,
        json!({ "type": "auth_error", "data": { "error": "Invalid or expired token" } })
    );
}

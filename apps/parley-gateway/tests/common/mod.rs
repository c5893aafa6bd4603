//! Shared test harness: boots a real gateway on an ephemeral port and
//! drives it over actual WebSockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::time;
use tokio_tungstenite::tungstenite;

use parley_gateway::auth::SessionClaims;
use parley_gateway::config::Config;
use parley_gateway::directory::{CommunityRecord, StaticDirectory};
use parley_gateway::gateway::broadcast::Broadcaster;
use parley_gateway::gateway::connections::ConnectionRegistry;
use parley_gateway::gateway::presence::PresenceIndex;
use parley_gateway::gateway::rooms::RoomManager;
use parley_gateway::AppState;

pub const TEST_SECRET: &str = "gateway-test-secret";

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a gateway with the given community snapshot. Returns the bound
/// address and the state for direct registry assertions.
pub async fn start_gateway(records: Vec<CommunityRecord>) -> (SocketAddr, AppState) {
    let presence = Arc::new(
        PresenceIndex::from_directory(&StaticDirectory::new(records))
            .await
            .expect("presence init"),
    );
    let connections = Arc::new(ConnectionRegistry::new());
    let rooms = Arc::new(RoomManager::new());
    let broadcaster = Broadcaster::new(presence.clone(), connections.clone());

    let state = AppState {
        config: Arc::new(Config {
            directory_url: "http://127.0.0.1:0".to_string(),
            gateway_secret: TEST_SECRET.to_string(),
            port: 0,
        }),
        connections,
        presence,
        rooms,
        broadcaster,
    };

    let app = parley_gateway::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Mint a session token the way the identity service would.
pub fn mint_token(identity: &str) -> String {
    let now = chrono::Utc::now();
    let claims = SessionClaims {
        sub: identity.to_string(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::seconds(300)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

pub async fn connect_global(addr: SocketAddr, identity: &str) -> WsStream {
    let url = format!("ws://{addr}/gateway?token={}", mint_token(identity));
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("global ws connect");
    ws
}

pub async fn connect_room(addr: SocketAddr, room_id: &str, identity: &str) -> WsStream {
    try_connect_room(addr, room_id, identity)
        .await
        .expect("room ws connect")
}

pub async fn try_connect_room(
    addr: SocketAddr,
    room_id: &str,
    identity: &str,
) -> Result<WsStream, tungstenite::Error> {
    let url = format!(
        "ws://{addr}/gateway/rooms/{room_id}?token={}",
        mint_token(identity)
    );
    tokio_tungstenite::connect_async(&url).await.map(|(ws, _)| ws)
}

/// Send one operation frame.
pub async fn send_op(ws: &mut WsStream, operation_type: &str, payload: serde_json::Value) {
    let frame = serde_json::json!({
        "operation_type": operation_type,
        "payload": payload,
    });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send op");
}

/// Receive the next event envelope, asserting the outbound wire shape.
pub async fn recv_event(ws: &mut WsStream) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for event")
        .expect("stream ended")
        .expect("ws read error");
    let text = msg.into_text().expect("not text");
    let envelope: serde_json::Value = serde_json::from_str(&text).expect("parse envelope");
    assert_eq!(envelope["success"], true);
    assert!(envelope["message"].is_string());
    envelope
}

/// Assert that no frame arrives within the grace window.
pub async fn assert_silent(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected silence, got {:?}", result);
}

/// Poll a registry predicate until it holds or the deadline passes.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, what: &str) {
    let deadline = time::Instant::now() + Duration::from_secs(2);
    while time::Instant::now() < deadline {
        if predicate() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

pub fn community(community_id: i64, members: &[&str]) -> CommunityRecord {
    CommunityRecord {
        community_id,
        member_identities: members.iter().map(|s| s.to_string()).collect(),
        channels: vec![],
    }
}

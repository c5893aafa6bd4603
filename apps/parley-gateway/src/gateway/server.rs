//! WebSocket upgrade handlers and per-connection loops for the two
//! signaling surfaces.
//!
//! Admission is decided before the upgrade completes: a bad token is an HTTP
//! 401, an identity outside a room's eligible set is an HTTP 403 — no
//! gateway state is created for a refused connection. The one post-upgrade
//! rejection is a room that vanished while the handshake was in flight.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth;
use crate::AppState;

use super::connections::ConnectionHandle;
use super::events::{ClientMessage, Envelope};
use super::router as signaling;

/// Application-level close code for a room that disappeared between the
/// admission check and the attach.
const CLOSE_NOT_ELIGIBLE: u16 = 4003;

#[derive(Deserialize)]
struct ConnectQuery {
    token: String,
}

enum Scope<'a> {
    Global,
    Room(&'a str),
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gateway", get(global_upgrade))
        .route("/gateway/rooms/{room_id}", get(room_upgrade))
}

async fn global_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = match auth::verify_session_token(&state.config.gateway_secret, &query.token) {
        Ok(identity) => identity,
        Err(reason) => {
            tracing::debug!(%reason, "gateway admission refused");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| run_global(socket, state, identity))
        .into_response()
}

async fn room_upgrade(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = match auth::verify_session_token(&state.config.gateway_secret, &query.token) {
        Ok(identity) => identity,
        Err(reason) => {
            tracing::debug!(%reason, %room_id, "room admission refused");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    if !state.rooms.is_eligible(&room_id, &identity) {
        tracing::debug!(%identity, %room_id, "identity not eligible for room; refusing");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| run_room(socket, state, room_id, identity))
        .into_response()
}

/// Global-surface connection loop: register, route pre-room operations,
/// purge on close.
async fn run_global(socket: WebSocket, state: AppState, identity: String) {
    let conn_id = state.connections.next_connection_id();
    let (handle, outbound_rx) = ConnectionHandle::new_pair(conn_id);

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(write_outbound(ws_tx, outbound_rx));

    // Silently replaces any prior connection for this identity.
    state.connections.register(&identity, handle);
    tracing::info!(%identity, conn_id, "gateway connection established");

    read_loop(ws_rx, &state, Scope::Global, &identity).await;

    // Teardown runs as one unit: guarded registry removal, then
    // detach-with-cascade from every room this identity occupies, notifying
    // remaining peers. The id guard keeps a superseded socket's late close
    // from evicting its replacement.
    state.connections.unregister_if(&identity, conn_id);
    for room_id in state.rooms.rooms_joined_by(&identity) {
        signaling::leave_room(&state, &room_id, &identity, false);
    }
    writer.abort();

    tracing::info!(%identity, conn_id, "gateway connection closed");
}

/// Room-surface connection loop: attach (re-validated post-handshake),
/// route in-call operations, detach on close.
async fn run_room(mut socket: WebSocket, state: AppState, room_id: String, identity: String) {
    let conn_id = state.connections.next_connection_id();
    let (handle, outbound_rx) = ConnectionHandle::new_pair(conn_id);

    // Eligibility was checked before the upgrade, but the room may have
    // emptied and been deleted while the handshake completed — fail fast
    // instead of entering the joined state.
    if !state.rooms.attach(&room_id, &identity, handle) {
        tracing::debug!(%identity, %room_id, "room vanished during handshake; closing");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_NOT_ELIGIBLE,
                reason: "Not eligible for this room".into(),
            })))
            .await;
        return;
    }

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(write_outbound(ws_tx, outbound_rx));

    tracing::info!(%identity, %room_id, conn_id, "room connection attached");

    read_loop(ws_rx, &state, Scope::Room(&room_id), &identity).await;

    // Socket close is an implicit leave: notify the remaining participants
    // and cascade-delete the room if this was the last one out.
    signaling::leave_room(&state, &room_id, &identity, false);
    writer.abort();

    tracing::info!(%identity, %room_id, conn_id, "room connection closed");
}

/// Read frames until the socket closes, dispatching each operation to the
/// signaling router. Malformed frames are logged and skipped — the
/// connection stays open.
async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    state: &AppState,
    scope: Scope<'_>,
    identity: &str,
) {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%identity, error = %e, "malformed signaling frame; ignoring");
                continue;
            }
        };

        match scope {
            Scope::Global => signaling::handle_global_op(state, identity, client_msg),
            Scope::Room(room_id) => signaling::handle_room_op(state, room_id, identity, client_msg),
        }
    }
}

/// Drain the outbound queue into the socket. Ends when the queue closes or
/// the peer stops reading.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = outbound_rx.recv().await {
        let json = serde_json::to_string(&envelope).unwrap();
        if ws_tx.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}

//! Operation dispatch: one incoming signaling frame in, zero or more
//! outbound envelopes to specific connections out.
//!
//! Routing policy is best-effort unicast: a named target that is not in the
//! room or has no live connection is dropped silently, because participants
//! leaving mid-negotiation is normal churn, not a fault. Each handler runs as
//! one synchronous unit over the registries.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::AppState;

use super::events::{
    AnswerPayload, ClientMessage, CreatePayload, Envelope, EventName, IceCandidatePayload,
    JoinPayload, LeavePayload, MediaUpdatePayload, OfferPayload, Operation,
};

/// Handle an operation arriving on the global (unscoped) connection.
pub fn handle_global_op(state: &AppState, identity: &str, msg: ClientMessage) {
    match msg.operation_type {
        Operation::Create => match parse_payload::<CreatePayload>(identity, msg.payload) {
            Some(CreatePayload::Direct { target_users }) => {
                create_direct_call(state, identity, target_users)
            }
            Some(CreatePayload::Community {
                community_id,
                channel_id,
            }) => create_community_call(state, identity, community_id, channel_id),
            None => {}
        },
        Operation::Join => {
            if let Some(payload) = parse_payload::<JoinPayload>(identity, msg.payload) {
                // Pure acknowledgement: the actual attachment happens when
                // the client opens the room-scoped connection.
                send_to_global(
                    state,
                    identity,
                    Envelope::event(
                        "Ready to join live chat",
                        json!({
                            "type": EventName::JOIN_LIVE_CHAT,
                            "room_id": payload.room_id,
                        }),
                    ),
                );
            }
        }
        Operation::Leave => {
            if let Some(payload) = parse_payload::<LeavePayload>(identity, msg.payload) {
                match payload.room_id {
                    Some(room_id) => leave_room(state, &room_id, identity, true),
                    None => {
                        tracing::warn!(%identity, "leave without room_id on global connection; ignoring")
                    }
                }
            }
        }
        op => {
            tracing::debug!(%identity, ?op, "room-scoped operation on global connection; ignoring")
        }
    }
}

/// Handle an operation arriving on a room-scoped connection.
pub fn handle_room_op(state: &AppState, room_id: &str, identity: &str, msg: ClientMessage) {
    match msg.operation_type {
        Operation::Ready => notify_ready(state, room_id, identity),
        Operation::Offer => {
            if let Some(p) = parse_payload::<OfferPayload>(identity, msg.payload) {
                relay_to_peer(
                    state,
                    room_id,
                    identity,
                    &p.target,
                    "Offer received",
                    EventName::OFFER_LIVE_CHAT,
                    "offer",
                    p.offer,
                );
            }
        }
        Operation::Answer => {
            if let Some(p) = parse_payload::<AnswerPayload>(identity, msg.payload) {
                relay_to_peer(
                    state,
                    room_id,
                    identity,
                    &p.target,
                    "Answer received",
                    EventName::ANSWER_LIVE_CHAT,
                    "answer",
                    p.answer,
                );
            }
        }
        Operation::IceCandidate => {
            if let Some(p) = parse_payload::<IceCandidatePayload>(identity, msg.payload) {
                relay_to_peer(
                    state,
                    room_id,
                    identity,
                    &p.target,
                    "ICE candidate received",
                    EventName::ICE_CANDIDATE_LIVE_CHAT,
                    "candidate",
                    p.candidate,
                );
            }
        }
        Operation::MediaUpdate => {
            if let Some(p) = parse_payload::<MediaUpdatePayload>(identity, msg.payload) {
                let Some(conn) = state.rooms.peer(room_id, &p.target) else {
                    tracing::debug!(%room_id, target = %p.target, "media-update target not joined; dropping");
                    return;
                };
                conn.send(Envelope::event(
                    "Media status updated",
                    json!({
                        "type": EventName::MEDIA_UPDATE_LIVE_CHAT,
                        "user": identity,
                        "kind": p.kind,
                        "enabled": p.enabled,
                    }),
                ));
            }
        }
        Operation::Leave => leave_room(state, room_id, identity, true),
        op => {
            tracing::debug!(%identity, %room_id, ?op, "global operation on room connection; ignoring")
        }
    }
}

/// Notify every other joined participant that the sender left, detach the
/// sender (cascading room deletion when the room empties), and acknowledge
/// the sender when `ack` is set. Also used by socket teardown, which skips
/// the ack.
pub(crate) fn leave_room(state: &AppState, room_id: &str, identity: &str, ack: bool) {
    if let Some(participants) = state.rooms.connections_in(room_id) {
        // Only an actual occupant's departure is announced; a second
        // teardown racing the first finds the identity already detached and
        // stays quiet.
        let was_joined = participants.iter().any(|(peer, _)| peer == identity);
        if was_joined {
            let notice = Envelope::event(
                "User left the live chat",
                json!({
                    "type": EventName::USER_LEFT_LIVE_CHAT,
                    "room_id": room_id,
                    "user": identity,
                }),
            );
            for (peer, conn) in &participants {
                if peer != identity {
                    conn.send(notice.clone());
                }
            }
        }

        if ack {
            let ack_envelope = Envelope::event(
                "Left the live chat",
                json!({
                    "type": EventName::LEAVE_LIVE_CHAT,
                    "room_id": room_id,
                }),
            );
            // Prefer the room-scoped connection; a global-surface leave from
            // a participant who never attached falls back to the registry.
            match participants.iter().find(|(peer, _)| peer == identity) {
                Some((_, conn)) => {
                    conn.send(ack_envelope);
                }
                None => send_to_global(state, identity, ack_envelope),
            }
        }
    } else if ack {
        // Room already gone — still acknowledge; leaving twice is not an
        // error.
        send_to_global(
            state,
            identity,
            Envelope::event(
                "Left the live chat",
                json!({
                    "type": EventName::LEAVE_LIVE_CHAT,
                    "room_id": room_id,
                }),
            ),
        );
    }

    state.rooms.detach(room_id, identity);
}

// ---------------------------------------------------------------------------
// create sub-cases
// ---------------------------------------------------------------------------

fn create_direct_call(state: &AppState, identity: &str, target_users: Vec<String>) {
    let mut eligible: HashSet<String> = target_users.iter().cloned().collect();
    eligible.insert(identity.to_string());

    let room_id = state.rooms.create_room(eligible);
    tracing::info!(%identity, %room_id, targets = target_users.len(), "direct live chat created");

    send_to_global(
        state,
        identity,
        Envelope::event(
            "Live chat created",
            json!({
                "type": EventName::CREATE_LIVE_CHAT,
                "room_id": room_id,
            }),
        ),
    );

    // Ring each target that currently has a live connection; missing targets
    // are skipped — best-effort, not guaranteed delivery.
    for target in &target_users {
        if target == identity {
            continue;
        }
        match state.connections.lookup(target) {
            Some(conn) => {
                conn.send(Envelope::event(
                    "You are being called",
                    json!({
                        "type": EventName::REQUEST_USER_TO_JOIN_LIVE_CHAT,
                        "room_id": room_id,
                        "user": identity,
                    }),
                ));
            }
            None => {
                tracing::debug!(%target, %room_id, "call target has no live connection; skipping")
            }
        }
    }
}

fn create_community_call(state: &AppState, identity: &str, community_id: i64, channel_id: i64) {
    // The caller is always eligible, even when the community is unknown and
    // the member snapshot comes back empty.
    let mut eligible = state.presence.members_of(community_id);
    eligible.insert(identity.to_string());

    let room_id = state.rooms.create_room(eligible);
    tracing::info!(%identity, %room_id, community_id, channel_id, "community live chat created");

    send_to_global(
        state,
        identity,
        Envelope::event(
            "Live chat created",
            json!({
                "type": EventName::CREATE_LIVE_CHAT,
                "room_id": room_id,
            }),
        ),
    );

    state.broadcaster.broadcast_to_community(
        community_id,
        identity,
        &Envelope::event(
            "Live chat started in your community",
            json!({
                "type": EventName::COMMUNITY_LIVE_CHAT_STARTED,
                "room_id": room_id,
                "community_id": community_id,
                "channel_id": channel_id,
                "user": identity,
            }),
        ),
    );
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn notify_ready(state: &AppState, room_id: &str, identity: &str) {
    let Some(participants) = state.rooms.connections_in(room_id) else {
        return;
    };
    let notice = Envelope::event(
        "User joined the live chat",
        json!({
            "type": EventName::USER_JOINED_LIVE_CHAT,
            "room_id": room_id,
            "user": identity,
        }),
    );
    for (peer, conn) in &participants {
        if peer != identity {
            conn.send(notice.clone());
        }
    }
}

/// Unicast relay: forward `body` verbatim to the one named target, annotated
/// with the sender. Never broadcast — negotiation payloads go to exactly one
/// connection.
#[allow(clippy::too_many_arguments)]
fn relay_to_peer(
    state: &AppState,
    room_id: &str,
    sender: &str,
    target: &str,
    message: &str,
    event: &str,
    field: &str,
    body: Value,
) {
    let Some(conn) = state.rooms.peer(room_id, target) else {
        tracing::debug!(%room_id, %target, %event, "relay target not joined; dropping");
        return;
    };
    let mut data = json!({
        "type": event,
        "user": sender,
    });
    data[field] = body;
    conn.send(Envelope::event(message, data));
}

fn send_to_global(state: &AppState, identity: &str, envelope: Envelope) {
    match state.connections.lookup(identity) {
        Some(conn) => {
            conn.send(envelope);
        }
        None => tracing::debug!(%identity, "no global connection for reply; dropping"),
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(identity: &str, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(%identity, error = %e, "malformed operation payload; ignoring");
            None
        }
    }
}

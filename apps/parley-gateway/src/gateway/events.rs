//! Signaling operations, event names, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Operations a client can send over a signaling connection.
///
/// `ready`, `offer`, `answer`, `ice-candidate`, and `media-update` are only
/// meaningful on a room-scoped connection; `create` and `join` only on the
/// global one; `leave` is accepted on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Ready,
    Create,
    Join,
    Offer,
    Answer,
    IceCandidate,
    MediaUpdate,
    Leave,
}

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub operation_type: Operation,
    #[serde(default)]
    pub payload: Value,
}

/// Payload of a `create` operation.
///
/// The two call shapes carry an explicit discriminant so dispatch is
/// exhaustive instead of sniffing for fields.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreatePayload {
    /// Direct call: the eligible set is the caller plus the named targets.
    Direct { target_users: Vec<String> },
    /// Community call: the eligible set is the community's member snapshot.
    Community { community_id: i64, channel_id: i64 },
}

/// Payload of a `join` acknowledgement request.
#[derive(Debug, Deserialize)]
pub struct JoinPayload {
    pub room_id: String,
}

/// Payload of an `offer` relay.
#[derive(Debug, Deserialize)]
pub struct OfferPayload {
    pub target: String,
    pub offer: Value,
}

/// Payload of an `answer` relay.
#[derive(Debug, Deserialize)]
pub struct AnswerPayload {
    pub target: String,
    pub answer: Value,
}

/// Payload of an `ice-candidate` relay.
#[derive(Debug, Deserialize)]
pub struct IceCandidatePayload {
    pub target: String,
    pub candidate: Value,
}

/// Media tracks a participant can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Camera,
    Microphone,
    Screen,
}

/// Payload of a `media-update` relay.
#[derive(Debug, Deserialize)]
pub struct MediaUpdatePayload {
    pub target: String,
    pub kind: MediaKind,
    pub enabled: bool,
}

/// Payload of a `leave` operation. `room_id` is required on the global
/// connection; the room-scoped connection already knows its room.
#[derive(Debug, Default, Deserialize)]
pub struct LeavePayload {
    #[serde(default)]
    pub room_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A message sent from the gateway to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

impl Envelope {
    /// Build an event envelope. `data` must carry a `type` field naming the
    /// event.
    pub fn event(message: &str, data: Value) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data,
        }
    }
}

/// Event names carried in `data.type`.
pub struct EventName;

impl EventName {
    pub const CREATE_LIVE_CHAT: &'static str = "create_live_chat";
    pub const REQUEST_USER_TO_JOIN_LIVE_CHAT: &'static str = "request_user_to_join_live_chat";
    pub const COMMUNITY_LIVE_CHAT_STARTED: &'static str = "community_live_chat_started";
    pub const JOIN_LIVE_CHAT: &'static str = "join_live_chat";
    pub const USER_JOINED_LIVE_CHAT: &'static str = "user_joined_live_chat";
    pub const OFFER_LIVE_CHAT: &'static str = "offer_live_chat";
    pub const ANSWER_LIVE_CHAT: &'static str = "answer_live_chat";
    pub const ICE_CANDIDATE_LIVE_CHAT: &'static str = "ice_candidate_live_chat";
    pub const MEDIA_UPDATE_LIVE_CHAT: &'static str = "media_update_live_chat";
    pub const USER_LEFT_LIVE_CHAT: &'static str = "user_left_live_chat";
    pub const LEAVE_LIVE_CHAT: &'static str = "leave_live_chat";
}

//! Wire envelopes exchanged with WebSocket clients.
//!
//! Inbound frames are JSON objects `{"type": <kind>, "data": <payload>}`. They are
//! parsed once into a [`RawEnvelope`] and then decoded into the closed
//! [`ClientMessage`] enum, each variant carrying a typed payload. Outbound traffic is
//! described by [`ServerMessage`] and serialized exactly once into a [`Frame`] that
//! is shared by every recipient queue.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Stable user identifier.
pub type UserId = String;
/// Stable group identifier.
pub type GroupId = String;

/// Protocol-level failures. Reported to the client; the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON")]
    InvalidJson,
    #[error("unknown message type: {0}")]
    UnknownKind(String),
    #[error("invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
    #[error("too many messages, slow down")]
    RateLimited,
}

impl ProtocolError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::UnknownKind(_) => "unknown_kind",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// A parsed but not yet interpreted inbound frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl RawEnvelope {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)
    }
}

/// Answer to a pending request or invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Declined,
}

impl Decision {
    pub fn as_status(self) -> RequestStatus {
        match self {
            Self::Accepted => RequestStatus::Accepted,
            Self::Declined => RequestStatus::Declined,
        }
    }
}

/// Lifecycle of follow edges, join requests and invitations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// Event attendance answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Going,
    NotGoing,
}

impl RsvpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Going => "going",
            Self::NotGoing => "not_going",
        }
    }
}

/// Payload naming another user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserTarget {
    #[serde(rename = "recipient_Id")]
    pub recipient_id: UserId,
}

/// Answer to a follow request sent by `recipient_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowResponse {
    #[serde(rename = "recipient_Id")]
    pub recipient_id: UserId,
    pub status: Decision,
}

/// Payload naming a group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupTarget {
    pub group_id: GroupId,
}

/// Payload naming a group and another user.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupUserTarget {
    pub group_id: GroupId,
    #[serde(rename = "recipient_Id")]
    pub recipient_id: UserId,
}

/// Admin's answer to a join request.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupJoinResponse {
    pub group_id: GroupId,
    #[serde(rename = "recipient_Id")]
    pub recipient_id: UserId,
    pub status: Decision,
}

/// Invitee's answer to an invitation.
#[derive(Debug, Clone, Deserialize)]
pub struct InvitationResponse {
    pub group_id: GroupId,
    pub status: Decision,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateMessageSend {
    #[serde(rename = "recipient_Id")]
    pub recipient_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMessageSend {
    pub group_id: GroupId,
    pub message: String,
}

/// A new group event. The group is named by id or, as older clients do, by title.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupEventCreate {
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub group_title: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "deserialize_event_time")]
    pub event_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRsvp {
    pub event_id: String,
    pub status: RsvpStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationTarget {
    pub notification_id: String,
}

/// Every inbound message kind the router understands.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    FollowRequest(UserTarget),
    FollowResponse(FollowResponse),
    CancelFollowRequest(UserTarget),
    Unfollow(UserTarget),
    GroupJoinRequest(GroupTarget),
    GroupJoinResponse(GroupJoinResponse),
    CancelGroupJoinRequest(GroupTarget),
    ExitGroup(GroupTarget),
    GroupInvitation(GroupUserTarget),
    GroupInvitationResponse(InvitationResponse),
    CancelGroupInvitation(GroupUserTarget),
    PrivateMessage(PrivateMessageSend),
    LoadPrivateMessages(UserTarget),
    MarkPrivateMessagesRead(UserTarget),
    GroupMessage(GroupMessageSend),
    LoadGroupMessages(GroupTarget),
    MarkGroupMessagesRead(GroupTarget),
    GroupEvent(GroupEventCreate),
    EventRsvp(EventRsvp),
    MarkNotificationRead(NotificationTarget),
    DeleteNotification(NotificationTarget),
}

impl ClientMessage {
    /// Decode the payload of a raw envelope according to its kind.
    pub fn decode(raw: RawEnvelope) -> Result<Self, ProtocolError> {
        let RawEnvelope { kind, data } = raw;
        let msg = match kind.as_str() {
            "follow_request" => Self::FollowRequest(payload("follow_request", data)?),
            "follow_response" => Self::FollowResponse(payload("follow_response", data)?),
            "cancel_follow_request" => {
                Self::CancelFollowRequest(payload("cancel_follow_request", data)?)
            }
            "unfollow" => Self::Unfollow(payload("unfollow", data)?),
            "group_join_request" => Self::GroupJoinRequest(payload("group_join_request", data)?),
            "group_join_response" => {
                Self::GroupJoinResponse(payload("group_join_response", data)?)
            }
            "cancel_group_join_request" => {
                Self::CancelGroupJoinRequest(payload("cancel_group_join_request", data)?)
            }
            "exit_group" => Self::ExitGroup(payload("exit_group", data)?),
            "group_invitation" => Self::GroupInvitation(payload("group_invitation", data)?),
            "group_invitation_response" => {
                Self::GroupInvitationResponse(payload("group_invitation_response", data)?)
            }
            "cancel_group_invitation" => {
                Self::CancelGroupInvitation(payload("cancel_group_invitation", data)?)
            }
            "private_message" => Self::PrivateMessage(payload("private_message", data)?),
            "load_private_messages" => {
                Self::LoadPrivateMessages(payload("load_private_messages", data)?)
            }
            "mark_private_messages_read" => {
                Self::MarkPrivateMessagesRead(payload("mark_private_messages_read", data)?)
            }
            "group_message" => Self::GroupMessage(payload("group_message", data)?),
            "load_group_messages" => {
                Self::LoadGroupMessages(payload("load_group_messages", data)?)
            }
            "mark_group_messages_read" => {
                Self::MarkGroupMessagesRead(payload("mark_group_messages_read", data)?)
            }
            "group_event" => Self::GroupEvent(payload("group_event", data)?),
            "event_rsvp" => Self::EventRsvp(payload("event_rsvp", data)?),
            "mark_notification_read" => {
                Self::MarkNotificationRead(payload("mark_notification_read", data)?)
            }
            "delete_notification" => {
                Self::DeleteNotification(payload("delete_notification", data)?)
            }
            _ => return Err(ProtocolError::UnknownKind(kind)),
        };
        Ok(msg)
    }

    /// Wire name of this message kind, used for metrics and spans.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FollowRequest(_) => "follow_request",
            Self::FollowResponse(_) => "follow_response",
            Self::CancelFollowRequest(_) => "cancel_follow_request",
            Self::Unfollow(_) => "unfollow",
            Self::GroupJoinRequest(_) => "group_join_request",
            Self::GroupJoinResponse(_) => "group_join_response",
            Self::CancelGroupJoinRequest(_) => "cancel_group_join_request",
            Self::ExitGroup(_) => "exit_group",
            Self::GroupInvitation(_) => "group_invitation",
            Self::GroupInvitationResponse(_) => "group_invitation_response",
            Self::CancelGroupInvitation(_) => "cancel_group_invitation",
            Self::PrivateMessage(_) => "private_message",
            Self::LoadPrivateMessages(_) => "load_private_messages",
            Self::MarkPrivateMessagesRead(_) => "mark_private_messages_read",
            Self::GroupMessage(_) => "group_message",
            Self::LoadGroupMessages(_) => "load_group_messages",
            Self::MarkGroupMessagesRead(_) => "mark_group_messages_read",
            Self::GroupEvent(_) => "group_event",
            Self::EventRsvp(_) => "event_rsvp",
            Self::MarkNotificationRead(_) => "mark_notification_read",
            Self::DeleteNotification(_) => "delete_notification",
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Accepts RFC 3339 as well as the `datetime-local` forms browsers submit.
fn deserialize_event_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    parse_event_time(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized event_time '{raw}'")))
}

pub(crate) fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Public profile fields attached to notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorSummary {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub avatar: String,
}

/// Whether a notification expects the recipient to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCase {
    ActionBased,
    InfoBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize)]
pub struct Presence {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

/// Row of a private conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateMessageRecord {
    pub id: String,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
}

/// Row of a group conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMessageRecord {
    pub id: String,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub sender_nickname: String,
    pub message: String,
    pub created_at: i64,
}

/// Every outbound envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Notification {
        case: NotificationCase,
        action_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        actor: Option<ActorSummary>,
        data: Value,
    },
    Error {
        code: &'static str,
        message: String,
    },
    Success {
        message: String,
    },
    PrivateMessages {
        data: Vec<PrivateMessageRecord>,
    },
    GroupMessages {
        data: Vec<GroupMessageRecord>,
    },
    Presence {
        data: Presence,
    },
}

impl ServerMessage {
    pub fn action(action_type: &str, actor: Option<ActorSummary>, data: Value) -> Self {
        Self::Notification {
            case: NotificationCase::ActionBased,
            action_type: action_type.to_string(),
            actor,
            data,
        }
    }

    pub fn info(action_type: &str, actor: Option<ActorSummary>, data: Value) -> Self {
        Self::Notification {
            case: NotificationCase::InfoBased,
            action_type: action_type.to_string(),
            actor,
            data,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    pub fn presence(user_id: &str, status: PresenceStatus) -> Self {
        Self::Presence {
            data: Presence {
                user_id: user_id.to_string(),
                status,
            },
        }
    }

    /// Serialize once into a shareable frame.
    pub fn to_frame(&self) -> Frame {
        match serde_json::to_string(self) {
            Ok(json) => Frame(Arc::from(json)),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound message");
                Frame(Arc::from(
                    r#"{"type":"error","code":"internal_error","message":"request failed"}"#,
                ))
            }
        }
    }
}

impl From<ProtocolError> for ServerMessage {
    fn from(err: ProtocolError) -> Self {
        Self::Error {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

/// A serialized outbound envelope. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a frame from already-serialized JSON.
    pub fn from_json(json: impl Into<Arc<str>>) -> Self {
        Self(json.into())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&&*self.0).finish()
    }
}

/// Escape text for safe embedding in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
        ClientMessage::decode(RawEnvelope::parse(text)?)
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(RawEnvelope::parse("{not json"), Err(ProtocolError::InvalidJson)));
        assert!(matches!(
            RawEnvelope::parse(r#"{"data":{}}"#),
            Err(ProtocolError::InvalidJson)
        ));
    }

    #[test]
    fn decodes_follow_request_with_legacy_field_name() {
        let msg = decode(r#"{"type":"follow_request","data":{"recipient_Id":"u2"}}"#)
            .expect("decodes");
        match msg {
            ClientMessage::FollowRequest(target) => assert_eq!(target.recipient_id, "u2"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_reported_by_name() {
        let err = decode(r#"{"type":"teleport","data":{}}"#).expect_err("unknown");
        assert!(matches!(&err, ProtocolError::UnknownKind(k) if k == "teleport"));
        assert_eq!(err.error_code(), "unknown_kind");
    }

    #[test]
    fn missing_payload_field_is_invalid_payload() {
        let err = decode(r#"{"type":"group_message","data":{"group_id":"g1"}}"#)
            .expect_err("missing message");
        assert!(matches!(err, ProtocolError::InvalidPayload { kind: "group_message", .. }));
    }

    #[test]
    fn decision_rejects_pending() {
        let err = decode(
            r#"{"type":"follow_response","data":{"recipient_Id":"u1","status":"pending"}}"#,
        )
        .expect_err("pending is not an answer");
        assert_eq!(err.error_code(), "invalid_payload");
    }

    #[test]
    fn event_time_accepts_browser_and_rfc3339_forms() {
        let expected = parse_event_time("2026-03-01T18:30:00Z").expect("rfc3339");
        assert_eq!(parse_event_time("2026-03-01T18:30"), Some(expected));
        assert_eq!(parse_event_time("2026-03-01 18:30:00"), Some(expected));
        assert_eq!(parse_event_time("next tuesday"), None);

        let msg = decode(
            r#"{"type":"group_event",
                "data":{"group_title":"Rust","title":"Meetup","event_time":""}}"#,
        )
        .expect("decodes");
        match msg {
            ClientMessage::GroupEvent(event) => assert!(event.event_time.is_none()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn kind_matches_wire_name() {
        let msg = decode(r#"{"type":"event_rsvp","data":{"event_id":"e1","status":"not_going"}}"#)
            .expect("decodes");
        assert_eq!(msg.kind(), "event_rsvp");
    }

    #[test]
    fn notification_serializes_with_case_and_optional_actor() {
        let frame = ServerMessage::info("new_follower", None, json!({"user_id": "u1"})).to_frame();
        let value: Value = serde_json::from_str(frame.as_str()).expect("json");
        assert_eq!(
            value,
            json!({
                "type": "notification",
                "case": "info_based",
                "action_type": "new_follower",
                "data": {"user_id": "u1"}
            })
        );
    }

    #[test]
    fn error_envelope_carries_code() {
        let frame = ServerMessage::from(ProtocolError::InvalidJson).to_frame();
        let value: Value = serde_json::from_str(frame.as_str()).expect("json");
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "invalid_json");
        assert_eq!(value["message"], "invalid JSON");
    }

    #[test]
    fn presence_envelope_shape() {
        let frame = ServerMessage::presence("u9", PresenceStatus::Online).to_frame();
        let value: Value = serde_json::from_str(frame.as_str()).expect("json");
        assert_eq!(
            value,
            json!({"type": "presence", "data": {"user_id": "u9", "status": "online"}})
        );
    }

    #[test]
    fn frame_clones_share_bytes() {
        let frame = ServerMessage::success("ok").to_frame();
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.as_str(), copy.as_str()));
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<b>\"hi\" & 'bye'</b>"),
            "&lt;b&gt;&#34;hi&#34; &amp; &#39;bye&#39;&lt;/b&gt;"
        );
    }
}

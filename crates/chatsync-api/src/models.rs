//! Wire payloads shared by REST responses and realtime events.
//!
//! Only the fields the sync engine needs for cache consistency are typed.
//! Everything else lands in the flattened `extra` map, which the core
//! persists as the entity's opaque extra-data blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Untyped leftover fields of a payload.
pub type ExtraFields = serde_json::Map<String, serde_json::Value>;

// ── User ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invisible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
    /// `name`, `image` and any caller-defined fields.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl UserPayload {
    /// A payload carrying nothing but the identity.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            online: None,
            banned: None,
            invisible: None,
            created_at: None,
            updated_at: None,
            last_active: None,
            extra: ExtraFields::new(),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPayload {
    /// `"{type}:{id}"`.
    pub cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserPayload>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ChannelPayload {
    pub fn with_cid(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            id: None,
            kind: None,
            member_count: None,
            frozen: None,
            created_at: None,
            updated_at: None,
            last_message_at: None,
            created_by: None,
            extra: ExtraFields::new(),
        }
    }
}

// ── Member ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPayload {
    pub user: UserPayload,
    /// Channel-level role (`"member"`, `"moderator"`, `"owner"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemberPayload {
    pub fn for_user(user: UserPayload) -> Self {
        Self {
            user,
            role: None,
            invited: None,
            invite_accepted_at: None,
            invite_rejected_at: None,
            created_at: None,
            updated_at: None,
        }
    }
}

// ── Message ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub user: UserPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Body of an outbound message send.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

// ── Responses ────────────────────────────────────────────────────────

/// One channel with its member list, as returned by channel queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatePayload {
    pub channel: ChannelPayload,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    #[serde(default)]
    pub messages: Vec<MessagePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelListPayload {
    #[serde(default)]
    pub channels: Vec<ChannelStatePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: MessagePayload,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_land_in_extra() {
        let raw = serde_json::json!({
            "id": "u1",
            "role": "admin",
            "name": "Luke",
            "image": "https://example.com/luke.png",
            "online": true
        });
        let user: UserPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(user.role.as_deref(), Some("admin"));
        assert_eq!(user.online, Some(true));
        assert_eq!(user.extra["name"], "Luke");
        assert!(!user.extra.contains_key("role"));
    }

    #[test]
    fn channel_list_decodes() {
        let raw = serde_json::json!({
            "channels": [{
                "channel": {
                    "cid": "messaging:c1",
                    "type": "messaging",
                    "id": "c1",
                    "member_count": 1,
                    "created_at": "2020-05-01T10:00:00Z",
                    "color": "blue"
                },
                "members": [{ "user": { "id": "u1" }, "role": "owner" }]
            }]
        });
        let list: ChannelListPayload = serde_json::from_value(raw).unwrap();
        let state = &list.channels[0];
        assert_eq!(state.channel.cid, "messaging:c1");
        assert_eq!(state.channel.kind.as_deref(), Some("messaging"));
        assert_eq!(state.channel.extra["color"], "blue");
        assert_eq!(state.members[0].user.id, "u1");
        assert!(state.messages.is_empty());
    }
}

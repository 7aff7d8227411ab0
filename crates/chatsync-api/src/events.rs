//! Remote events pushed over the realtime connection.
//!
//! The envelope is a JSON object tagged by its `"type"` field. Tags the
//! engine does not know decode to [`ChatEvent::Unknown`] so new server
//! events never break the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChannelPayload, MemberPayload, MessagePayload, UserPayload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "health.check")]
    HealthCheck(HealthCheck),

    // ── Channel membership of the current user ──
    #[serde(rename = "notification.added_to_channel")]
    AddedToChannel(ChannelEventBody),
    #[serde(rename = "notification.removed_from_channel")]
    RemovedFromChannel(ChannelRefBody),

    // ── Channel ──
    #[serde(rename = "channel.updated")]
    ChannelUpdated(ChannelEventBody),
    #[serde(rename = "channel.deleted")]
    ChannelDeleted(ChannelRefBody),

    // ── Members ──
    #[serde(rename = "member.added")]
    MemberAdded(MemberEventBody),
    #[serde(rename = "member.updated")]
    MemberUpdated(MemberEventBody),
    #[serde(rename = "member.removed")]
    MemberRemoved(MemberEventBody),

    // ── Messages ──
    #[serde(rename = "message.new")]
    MessageNew(MessageEventBody),

    // ── Presence ──
    #[serde(rename = "typing.start")]
    TypingStart(TypingEventBody),
    #[serde(rename = "typing.stop")]
    TypingStop(TypingEventBody),
    #[serde(rename = "user.updated")]
    UserUpdated(UserEventBody),

    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    /// Channel the event is scoped to, if any.
    pub fn cid(&self) -> Option<&str> {
        match self {
            Self::AddedToChannel(b) | Self::ChannelUpdated(b) => Some(&b.channel.cid),
            Self::RemovedFromChannel(b) | Self::ChannelDeleted(b) => Some(&b.cid),
            Self::MemberAdded(b) | Self::MemberUpdated(b) | Self::MemberRemoved(b) => {
                Some(&b.cid)
            }
            Self::MessageNew(b) => Some(&b.cid),
            Self::TypingStart(b) | Self::TypingStop(b) => Some(&b.cid),
            Self::HealthCheck(_) | Self::UserUpdated(_) | Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub me: Option<UserPayload>,
}

/// An event carrying the full channel and (optionally) its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEventBody {
    pub channel: ChannelPayload,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An event that only names a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRefBody {
    pub cid: String,
    #[serde(default)]
    pub channel: Option<ChannelPayload>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEventBody {
    pub cid: String,
    #[serde(default)]
    pub member: Option<MemberPayload>,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl MemberEventBody {
    /// The affected user, from the member payload or the bare user field.
    pub fn user_id(&self) -> Option<&str> {
        self.member
            .as_ref()
            .map(|m| m.user.id.as_str())
            .or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEventBody {
    pub cid: String,
    pub message: MessagePayload,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEventBody {
    pub cid: String,
    pub user: UserPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEventBody {
    pub user: UserPayload,
}

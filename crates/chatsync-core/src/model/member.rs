// ── Channel member domain type ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelId, MemberId};

/// Channel-level role. Unknown roles are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemberRole {
    Member,
    Moderator,
    Admin,
    Owner,
    Other(String),
}

impl MemberRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MemberRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "member" | "channel_member" => Self::Member,
            "moderator" | "channel_moderator" => Self::Moderator,
            "admin" => Self::Admin,
            "owner" => Self::Owner,
            _ => Self::Other(s),
        }
    }
}

impl From<MemberRole> for String {
    fn from(role: MemberRole) -> Self {
        role.as_str().to_owned()
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership of one user in one channel.
///
/// `user_id` references a row in the store's user table; read the user
/// through the store, never through the member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub cid: ChannelId,
    pub user_id: String,
    pub role: Option<MemberRole>,
    pub is_invited: Option<bool>,
    pub invite_accepted_at: Option<DateTime<Utc>>,
    pub invite_rejected_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(cid: ChannelId, user_id: impl Into<String>) -> Self {
        Self {
            cid,
            user_id: user_id.into(),
            role: None,
            is_invited: None,
            invite_accepted_at: None,
            invite_rejected_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn id(&self) -> MemberId {
        MemberId::new(self.cid.clone(), self.user_id.clone())
    }
}

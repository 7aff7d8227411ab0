// ── Entity identity ──
//
// Users are keyed by their id string, channels by (type, id), members by
// (channel, user). Identity is the only upsert key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── ChannelId ───────────────────────────────────────────────────────

/// Channel identity, displayed and serialized as `"{type}:{id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    kind: String,
    id: String,
}

impl ChannelId {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Channel type, e.g. `"messaging"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ChannelId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok(Self::new(kind, id)),
            _ => Err(CoreError::InvalidChannelId(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ChannelId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChannelId> for String {
    fn from(cid: ChannelId) -> Self {
        cid.to_string()
    }
}

// ── MemberId ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId {
    pub cid: ChannelId,
    pub user_id: String,
}

impl MemberId {
    pub fn new(cid: ChannelId, user_id: impl Into<String>) -> Self {
        Self {
            cid,
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cid, self.user_id)
    }
}

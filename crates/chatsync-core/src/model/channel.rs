// ── Channel domain type ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelId, ExtraData};

/// A cached channel. Members live in the store keyed by channel, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub cid: ChannelId,
    pub member_count: Option<u32>,
    pub is_frozen: Option<bool>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra_data: ExtraData,
}

impl Channel {
    pub fn new(cid: ChannelId) -> Self {
        Self {
            cid,
            member_count: None,
            is_frozen: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            last_message_at: None,
            extra_data: ExtraData::default(),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.extra_data
            .get("name")
            .and_then(|v| v.as_str().map(str::to_owned))
    }
}

// ── Message domain type ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelId, ExtraData};

/// Delivery state of a locally composed message. Absent once the server
/// has acknowledged it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocalMessageState {
    /// Stored locally, not yet handed to the network.
    Pending,
    /// Send in flight.
    Sending,
    /// Send failed; waiting for a caller-driven retry.
    SendingFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub cid: ChannelId,
    pub author_id: String,
    pub text: String,
    pub kind: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Set while the message only exists locally.
    pub local_state: Option<LocalMessageState>,
    #[serde(default)]
    pub extra_data: ExtraData,
}

impl Message {
    pub fn is_acknowledged(&self) -> bool {
        self.local_state.is_none()
    }
}

// ── User domain type ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExtraData;

/// Service-wide user role. Unknown roles are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserRole {
    User,
    Admin,
    Guest,
    Anonymous,
    Other(String),
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Guest => "guest",
            Self::Anonymous => "anonymous",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => Self::User,
            "admin" => Self::Admin,
            "guest" => Self::Guest,
            "anonymous" => Self::Anonymous,
            _ => Self::Other(s),
        }
    }
}

impl From<UserRole> for String {
    fn from(role: UserRole) -> Self {
        role.as_str().to_owned()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached user. Shared by every channel the user is a member of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: Option<UserRole>,
    pub is_online: Option<bool>,
    pub is_banned: Option<bool>,
    pub is_invisible: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra_data: ExtraData,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            is_online: None,
            is_banned: None,
            is_invisible: None,
            created_at: None,
            updated_at: None,
            last_active_at: None,
            extra_data: ExtraData::default(),
        }
    }

    /// Display name from the conventional `name` extra field.
    pub fn name(&self) -> Option<String> {
        self.extra_data
            .get("name")
            .and_then(|v| v.as_str().map(str::to_owned))
    }
}

use std::fmt;

use chrono::{DateTime, Utc};

/// Store-assigned id of a watched account (numeric, stable).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Opaque upstream user id (numeric string on the wire, never parsed).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalId(pub String);

impl ExternalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExternalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedAccount {
    pub id: AccountId,
    pub username: String,
    pub external_id: ExternalId,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Follow,
    Unfollow,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "follow" => Ok(Self::Follow),
            "unfollow" => Ok(Self::Unfollow),
            _ => Err(()),
        }
    }
}

/// One recorded transition in the append-only event log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowEvent {
    pub id: i64,
    pub account_id: AccountId,
    pub followed_id: ExternalId,
    pub kind: EventKind,
    pub detected_at: DateTime<Utc>,
}

/// Profile returned by a username lookup (used when adding an account).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub external_id: ExternalId,
    pub username: String,
    pub display_name: String,
    pub following_count: u64,
}

/// Profile returned by an id lookup (notification enrichment only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileSummary {
    pub username: String,
    pub display_name: String,
    pub follower_count: u64,
}

/// Normalize user input to a bare username: trims whitespace and a leading `@`.
pub fn normalize_username(raw: &str) -> Option<String> {
    let name = raw.trim();
    let name = name.strip_prefix('@').unwrap_or(name).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

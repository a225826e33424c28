use crate::domain::{ExternalId, ProfileSummary};

/// Maximum number of enumerated ids per notice.
pub const NOTICE_ENTRY_CAP: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Follow,
    Unfollow,
}

/// One affected id, with display data when the lookup succeeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoticeEntry {
    pub external_id: ExternalId,
    pub profile: Option<ProfileSummary>,
}

impl NoticeEntry {
    /// `@name (N followers)` or `ID: 123` when unenriched.
    pub fn label(&self) -> String {
        match &self.profile {
            Some(p) => format!("@{} ({} followers)", p.username, p.follower_count),
            None => format!("ID: {}", self.external_id),
        }
    }
}

/// One change summary: one watched account, one direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Username of the watched account.
    pub account: String,
    pub direction: Direction,
    /// Total ids that changed in this direction (may exceed `entries.len()`).
    pub total: usize,
    pub entries: Vec<NoticeEntry>,
}

impl ChangeNotice {
    /// Ids counted in `total` but not enumerated.
    pub fn omitted(&self) -> usize {
        self.total.saturating_sub(self.entries.len())
    }

    pub fn title(&self) -> String {
        match self.direction {
            Direction::Follow => format!("New Follows Detected for @{}", self.account),
            Direction::Unfollow => format!("Unfollows Detected for @{}", self.account),
        }
    }

    pub fn summary(&self) -> String {
        match self.direction {
            Direction::Follow => format!("Started following {} new accounts", self.total),
            Direction::Unfollow => format!("Unfollowed {} accounts", self.total),
        }
    }

    /// Trailer line for truncated notices.
    pub fn overflow_line(&self) -> Option<String> {
        match self.omitted() {
            0 => None,
            n => Some(format!("…and {n} more")),
        }
    }
}

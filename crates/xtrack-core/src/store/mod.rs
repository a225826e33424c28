//! Persistence for watched accounts, following snapshots, and the event log.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
    domain::{AccountId, ExternalId, FollowEvent, WatchedAccount},
    Result,
};

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

/// Outcome of a committed snapshot update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub follows_recorded: usize,
    pub unfollows_recorded: usize,
    pub snapshot_size: usize,
    pub detected_at: DateTime<Utc>,
}

/// Entries of the runtime state table, written by `xtrack run` and read by
/// other invocations against the same database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Unix millis when the running daemon started.
    RunStartedAt,
    /// Last observed upstream quota.
    RemainingQuota,
    /// Unix millis when the last cycle finished.
    LastCycleAt,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStartedAt => "run_started_at",
            Self::RemainingQuota => "remaining_quota",
            Self::LastCycleAt => "last_cycle_at",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub follows: u64,
    pub unfollows: u64,
}

/// Owner of all persisted tracking state.
///
/// Every method is a single transaction; callers never see partial writes.
pub trait SnapshotStore: Send + Sync {
    /// Fails with `DuplicateUsername` if the username is already watched.
    fn add_watched_account(&self, username: &str, external_id: &ExternalId) -> Result<AccountId>;

    /// Removes the account with its snapshot and events. `NotFound` if absent.
    fn remove_watched_account(&self, account_id: AccountId) -> Result<()>;

    fn list_watched_accounts(&self) -> Result<Vec<WatchedAccount>>;

    /// Case-insensitive lookup.
    fn find_account_by_username(&self, username: &str) -> Result<Option<WatchedAccount>>;

    /// Empty set (not an error) before the first fetch.
    fn get_snapshot(&self, account_id: AccountId) -> Result<HashSet<ExternalId>>;

    /// Records one event per id in `added`/`removed`, then rewrites the
    /// snapshot to exactly `latest`. All-or-nothing.
    fn apply_snapshot_update(
        &self,
        account_id: AccountId,
        latest: &HashSet<ExternalId>,
        added: &[ExternalId],
        removed: &[ExternalId],
    ) -> Result<AppliedUpdate>;

    /// Events ordered by detection time ascending, optionally from `since` (inclusive).
    fn get_events(
        &self,
        account_id: AccountId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FollowEvent>>;

    fn event_counts(&self, account_id: AccountId) -> Result<EventCounts>;

    fn put_state(&self, key: StateKey, value: &str) -> Result<()>;

    fn get_state(&self, key: StateKey) -> Result<Option<String>>;

    fn clear_state(&self, key: StateKey) -> Result<()>;
}

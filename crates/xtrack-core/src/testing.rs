//! Fakes for the ports, shared by the core unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    domain::{AccountId, ExternalId, FollowEvent, Profile, ProfileSummary, WatchedAccount},
    errors::Error,
    notify::{ChangeNotice, NotificationChannel},
    store::{AppliedUpdate, EventCounts, SnapshotStore, SqliteStore, StateKey},
    upstream::{FollowingPage, QuotaGauge, UpstreamPort},
    Result,
};

pub fn ids(raw: &[&str]) -> Vec<ExternalId> {
    raw.iter().map(|s| ExternalId::from(*s)).collect()
}

pub fn set(raw: &[&str]) -> HashSet<ExternalId> {
    raw.iter().map(|s| ExternalId::from(*s)).collect()
}

/// In-memory social graph. Following lists are served in pages of `page_size`.
pub struct FakeUpstream {
    pub profiles: Mutex<HashMap<String, Profile>>,
    pub following: Mutex<HashMap<ExternalId, Vec<ExternalId>>>,
    pub summaries: Mutex<HashMap<ExternalId, ProfileSummary>>,
    pub failing: Mutex<HashSet<ExternalId>>,
    pub stall: AtomicBool,
    pub page_size: usize,
    pub page_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    pub quota: QuotaGauge,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            following: Mutex::new(HashMap::new()),
            summaries: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            stall: AtomicBool::new(false),
            page_size: 2,
            page_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            quota: QuotaGauge::new(),
        }
    }

    pub fn with_user(self, username: &str, external_id: &str, follows: &[&str]) -> Self {
        self.profiles.lock().insert(
            username.to_lowercase(),
            Profile {
                external_id: external_id.into(),
                username: username.to_string(),
                display_name: username.to_uppercase(),
                following_count: follows.len() as u64,
            },
        );
        self.set_following(external_id, follows);
        self
    }

    pub fn with_summary(self, external_id: &str, username: &str, followers: u64) -> Self {
        self.summaries.lock().insert(
            external_id.into(),
            ProfileSummary {
                username: username.to_string(),
                display_name: username.to_string(),
                follower_count: followers,
            },
        );
        self
    }

    pub fn set_following(&self, external_id: &str, follows: &[&str]) {
        self.following.lock().insert(external_id.into(), ids(follows));
    }

    pub fn fail_for(&self, external_id: &str) {
        self.failing.lock().insert(external_id.into());
    }
}

#[async_trait]
impl UpstreamPort for FakeUpstream {
    async fn fetch_profile(&self, username: &str) -> Result<Profile> {
        self.quota.set(100);
        self.profiles
            .lock()
            .get(&username.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::upstream(404, "user not found"))
    }

    async fn fetch_following_page(
        &self,
        external_id: &ExternalId,
        cursor: Option<&str>,
    ) -> Result<FollowingPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().contains(external_id) {
            return Err(Error::upstream(503, "upstream unavailable"));
        }

        let all = self
            .following
            .lock()
            .get(external_id)
            .cloned()
            .ok_or_else(|| Error::upstream(404, "unknown user"))?;

        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(all.len());
        let next_cursor = (end < all.len()).then(|| end.to_string());
        Ok(FollowingPage {
            ids: all[start..end].to_vec(),
            next_cursor,
        })
    }

    async fn fetch_profile_by_id(&self, external_id: &ExternalId) -> Result<ProfileSummary> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.summaries
            .lock()
            .get(external_id)
            .cloned()
            .ok_or_else(|| Error::upstream(404, "user not found"))
    }

    fn remaining_quota(&self) -> Option<u32> {
        self.quota.get()
    }
}

/// Records every notice it is asked to send; optionally fails every send.
pub struct FakeChannel {
    pub name: String,
    pub fail: bool,
    pub sent: Mutex<Vec<ChangeNotice>>,
}

impl FakeChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> Vec<ChangeNotice> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl NotificationChannel for FakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notice: &ChangeNotice) -> Result<()> {
        if self.fail {
            return Err(Error::notification(&self.name, "webhook returned 500"));
        }
        self.sent.lock().push(notice.clone());
        Ok(())
    }
}

/// SQLite store whose snapshot updates can be made to fail per account.
pub struct FlakyStore {
    pub inner: SqliteStore,
    pub fail_updates_for: Mutex<HashSet<AccountId>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().expect("in-memory store"),
            fail_updates_for: Mutex::new(HashSet::new()),
        }
    }
}

impl SnapshotStore for FlakyStore {
    fn add_watched_account(&self, username: &str, external_id: &ExternalId) -> Result<AccountId> {
        self.inner.add_watched_account(username, external_id)
    }

    fn remove_watched_account(&self, account_id: AccountId) -> Result<()> {
        self.inner.remove_watched_account(account_id)
    }

    fn list_watched_accounts(&self) -> Result<Vec<WatchedAccount>> {
        self.inner.list_watched_accounts()
    }

    fn find_account_by_username(&self, username: &str) -> Result<Option<WatchedAccount>> {
        self.inner.find_account_by_username(username)
    }

    fn get_snapshot(&self, account_id: AccountId) -> Result<HashSet<ExternalId>> {
        self.inner.get_snapshot(account_id)
    }

    fn apply_snapshot_update(
        &self,
        account_id: AccountId,
        latest: &HashSet<ExternalId>,
        added: &[ExternalId],
        removed: &[ExternalId],
    ) -> Result<AppliedUpdate> {
        if self.fail_updates_for.lock().contains(&account_id) {
            return Err(Error::Storage("disk I/O error".to_string()));
        }
        self.inner
            .apply_snapshot_update(account_id, latest, added, removed)
    }

    fn get_events(
        &self,
        account_id: AccountId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FollowEvent>> {
        self.inner.get_events(account_id, since)
    }

    fn event_counts(&self, account_id: AccountId) -> Result<EventCounts> {
        self.inner.event_counts(account_id)
    }

    fn put_state(&self, key: StateKey, value: &str) -> Result<()> {
        self.inner.put_state(key, value)
    }

    fn get_state(&self, key: StateKey) -> Result<Option<String>> {
        self.inner.get_state(key)
    }

    fn clear_state(&self, key: StateKey) -> Result<()> {
        self.inner.clear_state(key)
    }
}

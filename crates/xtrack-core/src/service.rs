//! Operations behind the command-line front end, expressed purely in terms
//! of the store, upstream and reconciler contracts.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{
    domain::{normalize_username, FollowEvent, Profile, WatchedAccount},
    errors::Error,
    reconcile::{AccountOutcome, CycleReport, Reconciler},
    store::{EventCounts, SnapshotStore, StateKey},
    upstream::UpstreamPort,
    utils::from_unix_millis,
    Result,
};

#[derive(Clone, Debug)]
pub struct AddedAccount {
    pub account: WatchedAccount,
    pub profile: Profile,
    /// Result of storing the initial following set. A failed seed leaves the
    /// account in place; the next cycle seeds it.
    pub seed: AccountOutcome,
}

#[derive(Clone, Debug)]
pub struct AccountListing {
    pub account: WatchedAccount,
    pub following: usize,
    pub events: EventCounts,
}

#[derive(Clone, Debug)]
pub struct StatusReport {
    pub accounts: usize,
    /// Live gauge of this process, else the last value a daemon saved.
    pub remaining_quota: Option<u32>,
    /// Time since this process started.
    pub uptime: Duration,
    /// Start of the `xtrack run` daemon using this database, if one is running.
    pub daemon_started_at: Option<DateTime<Utc>>,
    /// Finish time of the most recent cycle of any process.
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub check_interval: Duration,
    pub channels: Vec<String>,
    pub cycles_completed: u64,
    pub last_cycle: Option<CycleReport>,
}

pub struct TrackerService {
    store: Arc<dyn SnapshotStore>,
    upstream: Arc<dyn UpstreamPort>,
    reconciler: Reconciler,
    started_at: Instant,
}

impl TrackerService {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        upstream: Arc<dyn UpstreamPort>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            store,
            upstream,
            reconciler,
            started_at: Instant::now(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Look up `raw` upstream, start watching it and seed its snapshot.
    pub async fn add_account(&self, raw: &str) -> Result<AddedAccount> {
        let username = parse_username(raw)?;
        if self.store.find_account_by_username(&username)?.is_some() {
            return Err(Error::DuplicateUsername(username));
        }

        let profile = self.upstream.fetch_profile(&username).await?;
        let canonical = if profile.username.is_empty() {
            username
        } else {
            profile.username.clone()
        };

        self.store
            .add_watched_account(&canonical, &profile.external_id)?;
        let account = self.find(&canonical)?;
        tracing::info!(
            account = %account.username,
            user_id = %account.external_id,
            following = profile.following_count,
            "watching account"
        );

        let seed = self.reconciler.seed_account(&account).await;
        Ok(AddedAccount {
            account,
            profile,
            seed,
        })
    }

    /// Stop watching `raw`; its snapshot and event history go with it.
    pub fn remove_account(&self, raw: &str) -> Result<WatchedAccount> {
        let account = self.find(&parse_username(raw)?)?;
        self.store.remove_watched_account(account.id)?;
        Ok(account)
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountListing>> {
        self.store
            .list_watched_accounts()?
            .into_iter()
            .map(|account| {
                let following = self.store.get_snapshot(account.id)?.len();
                let events = self.store.event_counts(account.id)?;
                Ok(AccountListing {
                    account,
                    following,
                    events,
                })
            })
            .collect()
    }

    pub fn events(
        &self,
        raw: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<(WatchedAccount, Vec<FollowEvent>)> {
        let account = self.find(&parse_username(raw)?)?;
        let events = self.store.get_events(account.id, since)?;
        Ok((account, events))
    }

    pub fn status(&self) -> Result<StatusReport> {
        let remaining_quota = match self.upstream.remaining_quota() {
            Some(q) => Some(q),
            None => self
                .store
                .get_state(StateKey::RemainingQuota)?
                .and_then(|v| v.parse().ok()),
        };

        Ok(StatusReport {
            accounts: self.store.list_watched_accounts()?.len(),
            remaining_quota,
            uptime: self.started_at.elapsed(),
            daemon_started_at: self.stored_time(StateKey::RunStartedAt)?,
            last_cycle_at: self.stored_time(StateKey::LastCycleAt)?,
            check_interval: self.reconciler.settings().check_interval,
            channels: self.reconciler.channel_names(),
            cycles_completed: self.reconciler.cycles_completed(),
            last_cycle: self.reconciler.last_cycle(),
        })
    }

    fn stored_time(&self, key: StateKey) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get_state(key)?
            .and_then(|v| v.parse::<i64>().ok())
            .map(from_unix_millis))
    }

    fn find(&self, username: &str) -> Result<WatchedAccount> {
        self.store
            .find_account_by_username(username)?
            .ok_or_else(|| Error::NotFound(format!("@{username} is not being watched")))
    }
}

fn parse_username(raw: &str) -> Result<String> {
    normalize_username(raw).ok_or_else(|| Error::InvalidUsername(raw.to_string()))
}

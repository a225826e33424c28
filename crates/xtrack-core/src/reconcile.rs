//! Reconciliation loop: fetch each watched account's following set, diff it
//! against the stored snapshot, persist the change and notify.
//!
//! One account's failure never aborts the cycle; it is reported as
//! [`AccountOutcome::Failed`] and retried on the next tick.
//!
//! `run` leaves its start time, and every cycle its finish time and the last
//! observed quota, in the store's runtime state so `xtrack status` can report
//! on a daemon running in another process.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, MAX_PARALLEL_ACCOUNTS},
    diff::diff,
    domain::{AccountId, WatchedAccount},
    notify::Dispatcher,
    store::{SnapshotStore, StateKey},
    upstream::{fetch_following_set, UpstreamPort},
    utils::unix_millis,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ReconcilerSettings {
    pub check_interval: Duration,
    /// Delay between following-id pages of one fetch.
    pub page_pacing: Duration,
    /// 1 = accounts are processed one after another.
    pub max_parallel_accounts: usize,
}

impl ReconcilerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            check_interval: cfg.check_interval,
            page_pacing: cfg.page_pacing(),
            max_parallel_accounts: cfg.max_parallel_accounts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountOutcome {
    Unchanged,
    Changed { added: usize, removed: usize },
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct AccountReport {
    pub account_id: AccountId,
    pub username: String,
    pub outcome: AccountOutcome,
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts: Vec<AccountReport>,
}

impl CycleReport {
    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Changed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Failed(_)))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Unchanged))
    }

    fn count(&self, pred: impl Fn(&AccountOutcome) -> bool) -> usize {
        self.accounts.iter().filter(|a| pred(&a.outcome)).count()
    }

    pub fn outcome_for(&self, account_id: AccountId) -> Option<&AccountOutcome> {
        self.accounts
            .iter()
            .find(|a| a.account_id == account_id)
            .map(|a| &a.outcome)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    store: Arc<dyn SnapshotStore>,
    upstream: Arc<dyn UpstreamPort>,
    dispatcher: Arc<Dispatcher>,
    settings: ReconcilerSettings,
    last_cycle: parking_lot::Mutex<Option<CycleReport>>,
    cycles: AtomicU64,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        upstream: Arc<dyn UpstreamPort>,
        dispatcher: Arc<Dispatcher>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                store,
                upstream,
                dispatcher,
                settings,
                last_cycle: parking_lot::Mutex::new(None),
                cycles: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> ReconcilerSettings {
        self.inner.settings
    }

    /// Most recent completed cycle, if any.
    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.inner.last_cycle.lock().clone()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    /// Names of the notification channels changes are sent to.
    pub fn channel_names(&self) -> Vec<String> {
        self.inner
            .dispatcher
            .channel_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Run cycles every `check_interval` until `shutdown` fires.
    ///
    /// The first cycle runs one interval after start. A cycle that overruns
    /// the interval delays the next tick instead of bursting.
    pub async fn run(&self, shutdown: CancellationToken) {
        let period = self.inner.settings.check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?period, "reconciler started");
        self.save_state(StateKey::RunStartedAt, Some(unix_millis(Utc::now()).to_string()));

        loop {
            tokio::select! {
              _ = shutdown.cancelled() => break,
              _ = ticker.tick() => {
                tokio::select! {
                  _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested mid-cycle; abandoning in-flight work");
                    break;
                  }
                  res = self.run_cycle() => {
                    if let Err(e) = res {
                      tracing::error!(error = %e, "reconciliation cycle failed");
                    }
                  }
                }
              }
            }
        }

        self.save_state(StateKey::RunStartedAt, None);
        tracing::info!("reconciler stopped");
    }

    /// One pass over every watched account.
    ///
    /// Fails only if the account list cannot be read.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let accounts = self.inner.store.list_watched_accounts()?;
        tracing::info!(accounts = accounts.len(), "reconciliation cycle started");

        let parallel = self
            .inner
            .settings
            .max_parallel_accounts
            .clamp(1, MAX_PARALLEL_ACCOUNTS);
        let reports = if parallel == 1 || accounts.len() <= 1 {
            let mut reports = Vec::with_capacity(accounts.len());
            for account in accounts {
                let outcome = self.reconcile_account(&account).await;
                reports.push(report_for(&account, outcome));
            }
            reports
        } else {
            self.fan_out(accounts, parallel).await
        };

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            accounts: reports,
        };
        tracing::info!(
            changed = report.changed(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            quota = ?self.inner.upstream.remaining_quota(),
            "reconciliation cycle finished"
        );

        self.save_state(
            StateKey::LastCycleAt,
            Some(unix_millis(report.finished_at).to_string()),
        );
        if let Some(quota) = self.inner.upstream.remaining_quota() {
            self.save_state(StateKey::RemainingQuota, Some(quota.to_string()));
        }

        *self.inner.last_cycle.lock() = Some(report.clone());
        self.inner.cycles.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Persist (or clear, on `None`) a runtime state entry. Failures are logged only.
    fn save_state(&self, key: StateKey, value: Option<String>) {
        let store = &self.inner.store;
        let res = match value {
            Some(v) => store.put_state(key, &v),
            None => store.clear_state(key),
        };
        if let Err(e) = res {
            tracing::warn!(key = key.as_str(), error = %e, "failed to save runtime state");
        }
    }

    async fn fan_out(&self, accounts: Vec<WatchedAccount>, parallel: usize) -> Vec<AccountReport> {
        let semaphore = Arc::new(Semaphore::new(parallel));
        let mut reports: Vec<AccountReport> = accounts
            .iter()
            .map(|a| report_for(a, AccountOutcome::Failed("task did not complete".to_string())))
            .collect();

        let mut tasks = JoinSet::new();
        for (idx, account) in accounts.into_iter().enumerate() {
            let this = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = this.reconcile_account(&account).await;
                (idx, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => reports[idx].outcome = outcome,
                Err(e) => tracing::error!(error = %e, "account task aborted"),
            }
        }
        reports
    }

    /// Reconcile one account and notify about any change.
    pub async fn reconcile_account(&self, account: &WatchedAccount) -> AccountOutcome {
        let inner = &self.inner;

        let latest = match fetch_following_set(
            inner.upstream.as_ref(),
            &account.external_id,
            inner.settings.page_pacing,
        )
        .await
        {
            Ok(v) => v,
            Err(e) => return self.failed(account, "fetch following", e),
        };

        let current = match inner.store.get_snapshot(account.id) {
            Ok(v) => v,
            Err(e) => return self.failed(account, "read snapshot", e),
        };

        let delta = diff(&current, &latest);
        if delta.is_empty() {
            tracing::debug!(account = %account.username, following = latest.len(), "no changes");
            return AccountOutcome::Unchanged;
        }

        let applied = match inner
            .store
            .apply_snapshot_update(account.id, &latest, &delta.added, &delta.removed)
        {
            Ok(v) => v,
            Err(e) => return self.failed(account, "store changes", e),
        };
        tracing::info!(
            account = %account.username,
            follows = applied.follows_recorded,
            unfollows = applied.unfollows_recorded,
            following = applied.snapshot_size,
            "following changes recorded"
        );

        inner
            .dispatcher
            .notify_follow_change(account, &delta.added, &delta.removed, inner.upstream.as_ref())
            .await;

        AccountOutcome::Changed {
            added: delta.added.len(),
            removed: delta.removed.len(),
        }
    }

    /// Store the initial following set of a freshly added account.
    ///
    /// This is a regular reconciliation against the still-empty snapshot: the
    /// whole set is recorded as Follow events and announced like any other
    /// follow change.
    pub async fn seed_account(&self, account: &WatchedAccount) -> AccountOutcome {
        self.reconcile_account(account).await
    }

    fn failed(&self, account: &WatchedAccount, step: &str, e: crate::Error) -> AccountOutcome {
        tracing::warn!(account = %account.username, step, error = %e, "account reconciliation failed");
        AccountOutcome::Failed(format!("{step}: {e}"))
    }
}

fn report_for(account: &WatchedAccount, outcome: AccountOutcome) -> AccountReport {
    AccountReport {
        account_id: account.id,
        username: account.username.clone(),
        outcome,
    }
}

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};

use crate::{
    domain::{AccountId, EventKind, ExternalId, FollowEvent, WatchedAccount},
    errors::Error,
    store::{schema, AppliedUpdate, EventCounts, SnapshotStore, StateKey},
    utils::{from_unix_millis, now_millis_precision, unix_millis},
    Result,
};

/// SQLite-backed [`SnapshotStore`].
pub struct SqliteStore {
    /// Single connection; every operation holds the lock for one transaction.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` (parent directories included).
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("failed to open {}: {e}", path.display())))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| Error::Storage(format!("failed to set PRAGMA: {e}")))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Body of [`SnapshotStore::apply_snapshot_update`] with a hook that runs
    /// after the events are written and before the snapshot is rewritten.
    fn apply_update_with(
        &self,
        account_id: AccountId,
        latest: &HashSet<ExternalId>,
        added: &[ExternalId],
        removed: &[ExternalId],
        after_events: impl FnOnce(&Transaction<'_>) -> Result<()>,
    ) -> Result<AppliedUpdate> {
        let detected_at = now_millis_precision();
        let ts = unix_millis(detected_at);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_account(&tx, account_id)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO follow_events (watched_account_id, user_id, event_type, detected_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for id in added {
                stmt.execute(params![account_id.0, id.as_str(), EventKind::Follow.as_str(), ts])?;
            }
            for id in removed {
                stmt.execute(params![account_id.0, id.as_str(), EventKind::Unfollow.as_str(), ts])?;
            }
        }

        after_events(&tx)?;

        tx.execute(
            "DELETE FROM following WHERE watched_account_id = ?1",
            [account_id.0],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO following (watched_account_id, followed_user_id) VALUES (?1, ?2)",
            )?;
            for id in latest {
                stmt.execute(params![account_id.0, id.as_str()])?;
            }
        }

        tx.commit()?;

        Ok(AppliedUpdate {
            follows_recorded: added.len(),
            unfollows_recorded: removed.len(),
            snapshot_size: latest.len(),
            detected_at,
        })
    }
}

impl SnapshotStore for SqliteStore {
    fn add_watched_account(&self, username: &str, external_id: &ExternalId) -> Result<AccountId> {
        let conn = self.conn.lock();
        let res = conn.execute(
            "INSERT INTO watched_accounts (username, user_id, added_at) VALUES (?1, ?2, ?3)",
            params![username, external_id.as_str(), unix_millis(Utc::now())],
        );

        match res {
            Ok(_) => {
                let id = AccountId(conn.last_insert_rowid());
                tracing::info!(%id, username, "added watched account");
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::DuplicateUsername(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove_watched_account(&self, account_id: AccountId) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_account(&tx, account_id)?;

        tx.execute(
            "DELETE FROM follow_events WHERE watched_account_id = ?1",
            [account_id.0],
        )?;
        tx.execute(
            "DELETE FROM following WHERE watched_account_id = ?1",
            [account_id.0],
        )?;
        tx.execute("DELETE FROM watched_accounts WHERE id = ?1", [account_id.0])?;
        tx.commit()?;

        tracing::info!(id = %account_id, "removed watched account");
        Ok(())
    }

    fn list_watched_accounts(&self) -> Result<Vec<WatchedAccount>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, username, user_id, added_at FROM watched_accounts ORDER BY id")?;
        let rows = stmt.query_map([], row_to_account)?;
        let accounts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    fn find_account_by_username(&self, username: &str) -> Result<Option<WatchedAccount>> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                "SELECT id, username, user_id, added_at FROM watched_accounts WHERE username = ?1",
                [username],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn get_snapshot(&self, account_id: AccountId) -> Result<HashSet<ExternalId>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT followed_user_id FROM following WHERE watched_account_id = ?1")?;
        let rows = stmt.query_map([account_id.0], |row| row.get::<_, String>(0))?;

        let mut out = HashSet::new();
        for id in rows {
            out.insert(ExternalId(id?));
        }
        Ok(out)
    }

    fn apply_snapshot_update(
        &self,
        account_id: AccountId,
        latest: &HashSet<ExternalId>,
        added: &[ExternalId],
        removed: &[ExternalId],
    ) -> Result<AppliedUpdate> {
        self.apply_update_with(account_id, latest, added, removed, |_| Ok(()))
    }

    fn get_events(
        &self,
        account_id: AccountId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FollowEvent>> {
        let since_ms = since.map(unix_millis).unwrap_or(i64::MIN);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, event_type, detected_at FROM follow_events
             WHERE watched_account_id = ?1 AND detected_at >= ?2
             ORDER BY detected_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![account_id.0, since_ms], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, user_id, kind, detected_at) = row?;
            let kind = kind
                .parse::<EventKind>()
                .map_err(|_| Error::Storage(format!("unknown event type {kind:?} in event {id}")))?;
            events.push(FollowEvent {
                id,
                account_id,
                followed_id: ExternalId(user_id),
                kind,
                detected_at: from_unix_millis(detected_at),
            });
        }
        Ok(events)
    }

    fn event_counts(&self, account_id: AccountId) -> Result<EventCounts> {
        let conn = self.conn.lock();
        let counts = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN event_type = 'follow' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN event_type = 'unfollow' THEN 1 ELSE 0 END), 0)
             FROM follow_events WHERE watched_account_id = ?1",
            [account_id.0],
            |row| {
                Ok(EventCounts {
                    follows: row.get::<_, i64>(0)?.max(0) as u64,
                    unfollows: row.get::<_, i64>(1)?.max(0) as u64,
                })
            },
        )?;
        Ok(counts)
    }

    fn put_state(&self, key: StateKey, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO runtime_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key.as_str(), value, unix_millis(Utc::now())],
        )?;
        Ok(())
    }

    fn get_state(&self, key: StateKey) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM runtime_state WHERE key = ?1",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn clear_state(&self, key: StateKey) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM runtime_state WHERE key = ?1", [key.as_str()])?;
        Ok(())
    }
}

fn ensure_account(tx: &Transaction<'_>, account_id: AccountId) -> Result<()> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM watched_accounts WHERE id = ?1",
            [account_id.0],
            |_| Ok(()),
        )
        .optional()?;
    exists.ok_or_else(|| Error::NotFound(format!("watched account {account_id}")))
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchedAccount> {
    Ok(WatchedAccount {
        id: AccountId(row.get(0)?),
        username: row.get(1)?,
        external_id: ExternalId(row.get(2)?),
        added_at: from_unix_millis(row.get(3)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;

    fn set(ids: &[&str]) -> HashSet<ExternalId> {
        ids.iter().map(|s| ExternalId::from(*s)).collect()
    }

    fn ids(ids: &[&str]) -> Vec<ExternalId> {
        ids.iter().map(|s| ExternalId::from(*s)).collect()
    }

    /// Apply `latest` the way the reconciler does: diff against the stored snapshot first.
    fn reconcile(store: &SqliteStore, account: AccountId, latest: &HashSet<ExternalId>) -> AppliedUpdate {
        let current = store.get_snapshot(account).unwrap();
        let delta = diff(&current, latest);
        store
            .apply_snapshot_update(account, latest, &delta.added, &delta.removed)
            .unwrap()
    }

    #[test]
    fn add_list_and_find_accounts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();
        let b = store.add_watched_account("bob", &"200".into()).unwrap();
        assert_ne!(a, b);

        let accounts = store.list_watched_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].username, "alice");
        assert_eq!(accounts[0].external_id, ExternalId::from("100"));
        assert_eq!(accounts[1].id, b);

        let found = store.find_account_by_username("ALICE").unwrap().unwrap();
        assert_eq!(found.id, a);
        assert!(store.find_account_by_username("carol").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected_case_insensitively() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_watched_account("alice", &"100".into()).unwrap();
        assert!(matches!(
            store.add_watched_account("alice", &"100".into()),
            Err(Error::DuplicateUsername(_))
        ));
        assert!(matches!(
            store.add_watched_account("Alice", &"999".into()),
            Err(Error::DuplicateUsername(_))
        ));
        assert_eq!(store.list_watched_accounts().unwrap().len(), 1);
    }

    #[test]
    fn snapshot_is_empty_before_first_fetch() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();
        assert!(store.get_snapshot(a).unwrap().is_empty());
        assert!(store.get_events(a, None).unwrap().is_empty());
    }

    #[test]
    fn update_records_events_and_converges_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();

        let seeded = reconcile(&store, a, &set(&["u1", "u2", "u3"]));
        assert_eq!(seeded.follows_recorded, 3);

        let latest = set(&["u2", "u3", "u4"]);
        let applied = reconcile(&store, a, &latest);
        assert_eq!(applied.follows_recorded, 1);
        assert_eq!(applied.unfollows_recorded, 1);
        assert_eq!(applied.snapshot_size, 3);
        assert_eq!(store.get_snapshot(a).unwrap(), latest);

        let events = store.get_events(a, Some(applied.detected_at)).unwrap();
        let follows: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Follow).collect();
        let unfollows: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Unfollow).collect();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].followed_id, ExternalId::from("u4"));
        assert_eq!(unfollows.len(), 1);
        assert_eq!(unfollows[0].followed_id, ExternalId::from("u1"));
    }

    #[test]
    fn reapplying_the_same_set_records_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();
        let latest = set(&["u1", "u2"]);

        reconcile(&store, a, &latest);
        let before = store.get_events(a, None).unwrap().len();
        let second = reconcile(&store, a, &latest);

        assert_eq!(second.follows_recorded + second.unfollows_recorded, 0);
        assert_eq!(store.get_events(a, None).unwrap().len(), before);
        assert_eq!(store.get_snapshot(a).unwrap(), latest);
    }

    #[test]
    fn snapshot_is_rewritten_to_exactly_latest() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();
        reconcile(&store, a, &set(&["u1", "u2", "u3", "u4"]));

        // Shrink to empty, then regrow.
        reconcile(&store, a, &set(&[]));
        assert!(store.get_snapshot(a).unwrap().is_empty());
        reconcile(&store, a, &set(&["u9"]));
        assert_eq!(store.get_snapshot(a).unwrap(), set(&["u9"]));
    }

    #[test]
    fn failure_between_event_and_snapshot_writes_rolls_back_everything() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();
        reconcile(&store, a, &set(&["u1", "u2", "u3"]));
        let events_before = store.get_events(a, None).unwrap();

        let res = store.apply_update_with(
            a,
            &set(&["u2", "u3", "u4"]),
            &ids(&["u4"]),
            &ids(&["u1"]),
            |_| Err(Error::Storage("injected failure".to_string())),
        );
        assert!(matches!(res, Err(Error::Storage(_))));

        assert_eq!(store.get_snapshot(a).unwrap(), set(&["u1", "u2", "u3"]));
        assert_eq!(store.get_events(a, None).unwrap(), events_before);

        // A retry after the failure records the transition exactly once.
        let applied = reconcile(&store, a, &set(&["u2", "u3", "u4"]));
        assert_eq!(applied.follows_recorded, 1);
        assert_eq!(applied.unfollows_recorded, 1);
        assert_eq!(store.get_events(a, None).unwrap().len(), events_before.len() + 2);
    }

    #[test]
    fn update_for_missing_account_is_not_found_and_writes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ghost = AccountId(42);
        let res = store.apply_snapshot_update(ghost, &set(&["u1"]), &ids(&["u1"]), &[]);
        assert!(matches!(res, Err(Error::NotFound(_))));
        assert!(store.get_events(ghost, None).unwrap().is_empty());
        assert!(store.get_snapshot(ghost).unwrap().is_empty());
    }

    #[test]
    fn remove_cascades_snapshot_and_events() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();
        let b = store.add_watched_account("bob", &"200".into()).unwrap();
        reconcile(&store, a, &set(&["u1", "u2"]));
        reconcile(&store, b, &set(&["u3"]));

        store.remove_watched_account(a).unwrap();

        assert!(store.get_snapshot(a).unwrap().is_empty());
        assert!(store.get_events(a, None).unwrap().is_empty());
        assert_eq!(store.get_snapshot(b).unwrap(), set(&["u3"]));
        assert_eq!(store.get_events(b, None).unwrap().len(), 1);
        assert!(matches!(
            store.remove_watched_account(a),
            Err(Error::NotFound(_))
        ));

        // The username is free again after removal.
        let again = store.add_watched_account("alice", &"100".into()).unwrap();
        assert_ne!(again, a);
    }

    #[test]
    fn events_are_chronological_and_filterable() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_watched_account("alice", &"100".into()).unwrap();

        reconcile(&store, a, &set(&["u1"]));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = reconcile(&store, a, &set(&["u2"]));

        let all = store.get_events(a, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].detected_at <= w[1].detected_at));

        let recent = store.get_events(a, Some(second.detected_at)).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|e| e.detected_at == second.detected_at));

        let counts = store.event_counts(a).unwrap();
        assert_eq!(counts, EventCounts { follows: 2, unfollows: 1 });
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let a = {
            let store = SqliteStore::open(&path).unwrap();
            let a = store.add_watched_account("alice", &"100".into()).unwrap();
            reconcile(&store, a, &set(&["u1", "u2"]));
            a
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_watched_accounts().unwrap().len(), 1);
        assert_eq!(store.get_snapshot(a).unwrap(), set(&["u1", "u2"]));
        assert_eq!(store.event_counts(a).unwrap().follows, 2);
    }

    #[test]
    fn runtime_state_upserts_and_clears() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_state(StateKey::RemainingQuota).unwrap(), None);

        store.put_state(StateKey::RemainingQuota, "480").unwrap();
        store.put_state(StateKey::RemainingQuota, "479").unwrap();
        store.put_state(StateKey::RunStartedAt, "1700000000000").unwrap();
        assert_eq!(
            store.get_state(StateKey::RemainingQuota).unwrap().as_deref(),
            Some("479")
        );

        store.clear_state(StateKey::RunStartedAt).unwrap();
        assert_eq!(store.get_state(StateKey::RunStartedAt).unwrap(), None);
        assert!(store.get_state(StateKey::RemainingQuota).unwrap().is_some());
    }
}

//! SQLite schema for the tracker database.

use rusqlite::Connection;

use crate::{errors::Error, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 2;

/// Create tables on a fresh database, migrate older ones, and refuse
/// databases written by a newer build.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current = get_schema_version(conn)?;

    if current == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current < SCHEMA_VERSION {
        migrate(conn, current, SCHEMA_VERSION)?;
    } else if current > SCHEMA_VERSION {
        return Err(Error::Storage(format!(
            "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS watched_accounts (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            user_id TEXT NOT NULL,
            added_at INTEGER NOT NULL
        );

        -- Current snapshot: one row per (account, followed user)
        CREATE TABLE IF NOT EXISTS following (
            watched_account_id INTEGER NOT NULL,
            followed_user_id TEXT NOT NULL,
            PRIMARY KEY (watched_account_id, followed_user_id),
            FOREIGN KEY (watched_account_id) REFERENCES watched_accounts(id)
        ) WITHOUT ROWID;

        -- Append-only change log; detected_at is unix millis
        CREATE TABLE IF NOT EXISTS follow_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            watched_account_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            event_type TEXT NOT NULL CHECK (event_type IN ('follow', 'unfollow')),
            detected_at INTEGER NOT NULL,
            FOREIGN KEY (watched_account_id) REFERENCES watched_accounts(id)
        );

        CREATE INDEX IF NOT EXISTS idx_follow_events_account
            ON follow_events(watched_account_id, detected_at);
        "#,
    )?;
    create_runtime_state(conn)
}

fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    for version in from..to {
        if version == 1 {
            create_runtime_state(conn)?;
        }
    }
    set_schema_version(conn, to)?;
    tracing::info!(from, to, "database schema migrated");
    Ok(())
}

/// v2: state the running daemon leaves for other invocations (quota, start time).
fn create_runtime_state(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS runtime_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

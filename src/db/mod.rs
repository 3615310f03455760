//! Persistence layer: a typed relational store over users/apps/chats/messages
//!
//! Backed by SQLite through `rusqlite` pooled with `r2d2`, matching the
//! connection-pooling shape the teacher already uses for its lifetime-stats
//! store. Schema creation is idempotent (`CREATE TABLE IF NOT EXISTS`) and
//! runs once at startup; per the spec, migration errors are logged but never
//! fatal — tables may already exist from a previous run.

pub mod apps;
pub mod chats;
pub mod messages;
pub mod models;
pub mod settings;
pub mod users;

use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type Conn = r2d2::PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS apps (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    display_name   TEXT NOT NULL,
    template       TEXT,
    favorite       INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_apps_owner ON apps(owner_user_id);

CREATE TABLE IF NOT EXISTS chats (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id     INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    title      TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_chats_app ON chats(app_id);

CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id    INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    role       TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
    content    TEXT NOT NULL,
    request_id TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, created_at, id);

CREATE TABLE IF NOT EXISTS user_settings (
    user_id    INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    provider   TEXT NOT NULL DEFAULT 'anthropic',
    model      TEXT NOT NULL DEFAULT 'claude-sonnet-4-5',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
"#;

/// Open (creating if absent) the SQLite database at `path` and ensure the schema exists.
pub fn open(path: &Path) -> anyhow::Result<Pool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
    });
    let pool = r2d2::Pool::new(manager)?;

    let conn = pool.get()?;
    if let Err(err) = conn.execute_batch(SCHEMA) {
        // Non-fatal per the spec's migration policy: tables may already exist
        // in a shape a prior run left them in.
        tracing::warn!("schema initialization reported an error: {err}");
    }

    Ok(pool)
}

#[cfg(test)]
pub fn open_in_memory() -> Pool {
    // max_size(1): a fresh `:memory:` database is created per connection, so
    // the pool must never hand out a second one or tests would see an empty DB.
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
    pool.get().unwrap().execute_batch(SCHEMA).unwrap();
    pool
}

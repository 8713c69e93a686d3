// SQLite store backend.
//
// One table keyed by (collection, key), JSON value column, WAL journal
// mode, schema migrations tracked in `schema_migrations`.

use std::fs;
use std::path::Path;
use std::sync::Mutex as StdMutex;

use rusqlite::{params, Connection};
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeBus, KvStore, StoreChange, StoreError};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE records (
    collection  TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    PRIMARY KEY (collection, key)
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

pub struct SqliteStore {
    conn: StdMutex<Connection>,
    bus: ChangeBus,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                StoreError::Backend(format!(
                    "failed to create store parent directory `{}`: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut conn = Connection::open(path).map_err(|error| {
            StoreError::Backend(format!("failed to open store at `{}`: {error}", path.display()))
        })?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn: StdMutex::new(conn), bus: ChangeBus::default() })
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().expect("sqlite store lock poisoned");
        current_schema_version(&conn)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().expect("sqlite store lock poisoned");
        let mut statement =
            conn.prepare("SELECT value FROM records WHERE collection = ?1 AND key = ?2")?;
        let mut rows = statement.query(params![collection, key])?;

        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    fn set(&self, collection: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock().expect("sqlite store lock poisoned");
        conn.execute(
            "INSERT INTO records (collection, key, value, updated_at)
             VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT (collection, key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![collection, key, raw],
        )?;
        drop(conn);
        self.bus.publish(collection, key);
        Ok(())
    }

    fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite store lock poisoned");
        let removed =
            conn.execute("DELETE FROM records WHERE collection = ?1 AND key = ?2", params![
                collection, key
            ])?;
        drop(conn);
        if removed > 0 {
            self.bus.publish(collection, key);
        }
        Ok(())
    }

    fn subscribe(&self, collection: &str) -> broadcast::Receiver<StoreChange> {
        self.bus.subscribe(collection)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        ",
    )?;
    Ok(())
}

fn current_schema_version(conn: &Connection) -> Result<i64, StoreError> {
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let current = current_schema_version(conn)?;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", params![version])?;
        tx.commit()?;
    }
    Ok(())
}

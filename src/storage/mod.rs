use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Thread-safe SQLite store holding line-addressed records and serialized objects
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            -- One row per (record, line); records are sparse
            CREATE TABLE IF NOT EXISTS lines (
                key TEXT NOT NULL,
                idx INTEGER NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (key, idx)
            );

            CREATE TABLE IF NOT EXISTS objects (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )
        .context("Failed to run store migrations")?;
        Ok(())
    }

    /// Read a single line of a record. Missing lines yield `None`.
    pub async fn read_line(&self, key: &str, index: u32) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT value FROM lines WHERE key = ?1 AND idx = ?2",
            rusqlite::params![key, index],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read line {} of '{}'", index, key))
    }

    /// Overwrite a single line of a record, creating it if needed.
    pub async fn write_line(&self, key: &str, index: u32, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO lines (key, idx, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, idx) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            rusqlite::params![key, index, value],
        )
        .with_context(|| format!("Failed to write line {} of '{}'", index, key))?;
        debug!("Wrote line {} of '{}'", index, key);
        Ok(())
    }

    pub async fn save_object<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize object '{}'", key))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO objects (key, body) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                updated_at = datetime('now')",
            rusqlite::params![key, body],
        )
        .with_context(|| format!("Failed to save object '{}'", key))?;
        Ok(())
    }

    pub async fn load_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let body: Option<String> = {
            let conn = self.conn.lock().await;
            conn.query_row(
                "SELECT body FROM objects WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to load object '{}'", key))?
        };

        match body {
            Some(body) => {
                let value = serde_json::from_str(&body)
                    .with_context(|| format!("Failed to deserialize object '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Whether any line or object is stored under `key`
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let found: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM lines WHERE key = ?1)
                     OR EXISTS(SELECT 1 FROM objects WHERE key = ?1)",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to check for '{}'", key))?;
        Ok(found)
    }
}

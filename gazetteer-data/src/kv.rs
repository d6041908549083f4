//! SQLite-backed [`KeyValueStore`].

use std::path::{Path, PathBuf};

use gazetteer_core::{KeyValueStore, KvError};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Failure opening the store.
#[derive(Debug, Error)]
#[error("failed to open key-value store at {path:?}")]
pub struct KvOpenError {
    /// Database location; `:memory:` for in-memory stores.
    pub path: PathBuf,
    /// SQLite failure.
    #[source]
    pub source: rusqlite::Error,
}

/// Key-value store in a single `kv` table.
#[derive(Debug)]
pub struct SqliteKeyValueStore {
    connection: Connection,
    location: PathBuf,
}

impl SqliteKeyValueStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    /// Returns [`KvOpenError`] when the database cannot be opened or the
    /// table cannot be created.
    pub fn open(path: &Path) -> Result<Self, KvOpenError> {
        let connection = Connection::open(path).map_err(|source| KvOpenError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::initialise(connection, path.to_path_buf())
    }

    /// Transient store, mostly for tests and dry runs.
    ///
    /// # Errors
    /// See [`Self::open`].
    pub fn in_memory() -> Result<Self, KvOpenError> {
        let location = PathBuf::from(":memory:");
        let connection = Connection::open_in_memory().map_err(|source| KvOpenError {
            path: location.clone(),
            source,
        })?;
        Self::initialise(connection, location)
    }

    fn initialise(connection: Connection, location: PathBuf) -> Result<Self, KvOpenError> {
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL
                )",
                [],
            )
            .map_err(|source| KvOpenError {
                path: location.clone(),
                source,
            })?;
        Ok(Self {
            connection,
            location,
        })
    }

    /// Location of the underlying database.
    pub fn path(&self) -> &Path {
        &self.location
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.connection
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|source| kv_error(key, source))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.connection
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|source| kv_error(key, source))
    }
}

fn kv_error(key: &str, source: rusqlite::Error) -> KvError {
    KvError {
        key: key.to_owned(),
        source: Box::new(source),
    }
}

//! `SQLite` storage for the identity cache.
//!
//! Keeps resolved identities between runs so titles are only looked up once.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::config::CACHE_DATABASE_PATH;

/// Database wrapper for identity cache rows.
pub struct Database {
    connection: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Print debug information about the database contents.
    pub fn print_debug_info(&self) {
        match &self.path {
            Some(path) => eprintln!("Cache database: {}", path.display()),
            None => eprintln!("Cache database: in-memory"),
        }
        match self.load() {
            Ok(entries) => {
                if entries.is_empty() {
                    eprintln!("Cache: empty");
                } else {
                    eprintln!("Cache entries ({}):", entries.len());
                    for (key, entry) in entries {
                        eprintln!("  {key} -> {entry}");
                    }
                }
            }
            Err(e) => {
                eprintln!("Failed to get cache entries: {e}");
            }
        }
    }

    /// Open or create the database at the default path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_default() -> Result<Self> {
        Self::open(&CACHE_DATABASE_PATH)
    }

    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let connection =
            Connection::open(path).with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Set busy timeout for concurrent access (5 seconds)
        connection
            .busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        let database = Self {
            connection,
            path: Some(path.to_path_buf()),
        };
        database.initialize()?;

        Ok(database)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let database = Self { connection, path: None };
        database.initialize()?;

        Ok(database)
    }

    /// Get the count of cached identities.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM identity_cache", [], |row| row.get(0))
            .context("Failed to count entries")?;

        Ok(count as u64)
    }

    /// Remove all cached identities.
    ///
    /// Returns the number of removed rows.
    pub fn clear(&self) -> Result<usize> {
        self.connection
            .execute("DELETE FROM identity_cache", [])
            .context("Failed to clear identity cache")
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<()> {
        self.connection
            .execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS identity_cache (
                    title TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    canonical TEXT,
                    alternative_names TEXT NOT NULL DEFAULT '[]',
                    cached_at TEXT NOT NULL,
                    PRIMARY KEY (title, platform)
                );

                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA cache_size = -2000;
                ",
            )
            .context("Failed to initialize database schema")?;

        Ok(())
    }
}

impl CacheStore for Database {
    fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT title, platform, canonical, alternative_names, cached_at FROM identity_cache ORDER BY title, platform",
            )
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("Failed to execute query")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect results")?;

        rows.into_iter()
            .map(|(title, platform, canonical, alternative_names, cached_at)| -> Result<(CacheKey, CacheEntry)> {
                let alternative_names: Vec<String> = serde_json::from_str(&alternative_names)
                    .with_context(|| format!("Invalid alternative names for '{title}'"))?;
                let cached_at = DateTime::parse_from_rfc3339(&cached_at)
                    .with_context(|| format!("Invalid cache timestamp for '{title}'"))?
                    .with_timezone(&Utc);
                Ok((
                    CacheKey { title, platform },
                    CacheEntry {
                        canonical,
                        alternative_names,
                        cached_at,
                    },
                ))
            })
            .collect()
    }

    fn save(&self, entries: &[(CacheKey, CacheEntry)]) -> Result<()> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .context("Failed to start transaction")?;
        {
            let mut stmt = transaction
                .prepare(
                    r"
                    INSERT INTO identity_cache (title, platform, canonical, alternative_names, cached_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(title, platform) DO UPDATE SET
                        canonical = ?3,
                        alternative_names = ?4,
                        cached_at = ?5
                    ",
                )
                .context("Failed to prepare upsert")?;

            for (key, entry) in entries {
                let alternative_names =
                    serde_json::to_string(&entry.alternative_names).context("Failed to serialize alternative names")?;
                stmt.execute(params![
                    key.title,
                    key.platform,
                    entry.canonical,
                    alternative_names,
                    entry.cached_at.to_rfc3339(),
                ])
                .with_context(|| format!("Failed to upsert cache entry: {key}"))?;
            }
        }
        transaction.commit().context("Failed to commit cache entries")?;
        Ok(())
    }
}

//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheEntry, CacheKey, StoredResponse};

/// Counts reported by [`CacheStorage::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
  pub entries: usize,
  pub expired: usize,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up an entry. `Ok(None)` means nothing is stored under the key.
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

  /// Store an entry, replacing any entry with the same key.
  fn put(&self, entry: &CacheEntry) -> Result<()>;

  /// Remove an entry. Removing a missing key is not an error.
  fn evict(&self, key: &CacheKey) -> Result<()>;

  /// Remove every entry expired at `now`, returning how many were removed.
  fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

  /// Remove every entry.
  fn clear(&self) -> Result<usize>;

  fn stats(&self, now: DateTime<Utc>) -> Result<StorageStats>;

  fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
    entry.is_expired(now)
  }
}

impl<S: CacheStorage + ?Sized> CacheStorage for Box<S> {
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    (**self).get(key)
  }

  fn put(&self, entry: &CacheEntry) -> Result<()> {
    (**self).put(entry)
  }

  fn evict(&self, key: &CacheKey) -> Result<()> {
    (**self).evict(key)
  }

  fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
    (**self).purge_expired(now)
  }

  fn clear(&self) -> Result<usize> {
    (**self).clear()
  }

  fn stats(&self, now: DateTime<Utc>) -> Result<StorageStats> {
    (**self).stats(now)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, _entry: &CacheEntry) -> Result<()> {
    Ok(()) // Discard
  }

  fn evict(&self, _key: &CacheKey) -> Result<()> {
    Ok(())
  }

  fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
    Ok(0)
  }

  fn clear(&self) -> Result<usize> {
    Ok(0)
  }

  fn stats(&self, _now: DateTime<Utc>) -> Result<StorageStats> {
    Ok(StorageStats::default())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at `path`, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Storage that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Application data directory that cache databases live under.
  pub fn default_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("t212"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    cache_key TEXT PRIMARY KEY,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, created_at, ttl_ms FROM response_cache
         WHERE cache_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, i64, i64)> = stmt
      .query_row(params![key.as_str()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    let Some((status, headers, body, created_at, ttl_ms)) = row else {
      return Ok(None);
    };

    let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;
    let created_at = DateTime::from_timestamp_millis(created_at)
      .ok_or_else(|| eyre!("Invalid cached timestamp {}", created_at))?;

    Ok(Some(CacheEntry {
      key: key.clone(),
      response: StoredResponse {
        status,
        headers,
        body,
      },
      created_at,
      ttl: Duration::milliseconds(ttl_ms),
    }))
  }

  fn put(&self, entry: &CacheEntry) -> Result<()> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&entry.response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    // Single statement, so readers see either the old row or the new one
    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (cache_key, status, headers, body, created_at, ttl_ms)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          entry.key.as_str(),
          entry.response.status,
          headers,
          entry.response.body,
          entry.created_at.timestamp_millis(),
          entry.ttl.num_milliseconds(),
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn evict(&self, key: &CacheKey) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM response_cache WHERE cache_key = ?",
        params![key.as_str()],
      )
      .map_err(|e| eyre!("Failed to evict cache entry: {}", e))?;
    Ok(())
  }

  fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM response_cache WHERE ? - created_at >= ttl_ms",
        params![now.timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to purge expired entries: {}", e))?;
    Ok(removed)
  }

  fn clear(&self) -> Result<usize> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM response_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(removed)
  }

  fn stats(&self, now: DateTime<Utc>) -> Result<StorageStats> {
    let conn = self.lock()?;
    let (entries, expired): (i64, i64) = conn
      .query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN ? - created_at >= ttl_ms THEN 1 ELSE 0 END), 0)
         FROM response_cache",
        params![now.timestamp_millis()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .map_err(|e| eyre!("Failed to read cache stats: {}", e))?;

    Ok(StorageStats {
      entries: entries as usize,
      expired: expired as usize,
    })
  }
}

//! Database connection management with WAL mode support.
//!
//! A single SQLite connection guarded by a mutex, configured for either
//! local (WAL) or cloud-safe (DELETE journal) operation depending on
//! `StorageMode`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use super::migrations::run_migrations;
use crate::error::Result;
use crate::types::{StorageConfig, StorageMode};

/// Owns the single SQLite connection used by the Record Store.
///
/// Cheap to clone (`Arc` around the mutex); every write path goes through
/// [`Storage::with_connection`] or [`Storage::with_transaction`] so callers
/// never see the raw `Connection`.
#[derive(Clone)]
pub struct Storage {
    config: StorageConfig,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open (creating if necessary) the database described by `config`, run
    /// migrations, and configure pragmas for its storage mode.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;
        run_migrations(&conn)?;
        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database, primarily for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StorageConfig::in_memory())
    }

    fn create_connection(config: &StorageConfig) -> Result<Connection> {
        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(&config.db_path)?
        };
        Self::configure_pragmas(&conn, config.storage_mode)?;
        Ok(conn)
    }

    /// Local mode uses WAL for throughput and crash recovery. Cloud-safe mode
    /// uses DELETE journaling because a WAL file in a folder synced by
    /// Dropbox/iCloud/OneDrive can be corrupted by concurrent sync writes.
    fn configure_pragmas(conn: &Connection, mode: StorageMode) -> Result<()> {
        match mode {
            StorageMode::Local => conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA busy_timeout=5000;
                PRAGMA foreign_keys=ON;
                "#,
            )?,
            StorageMode::CloudSafe => conn.execute_batch(
                r#"
                PRAGMA journal_mode=DELETE;
                PRAGMA synchronous=FULL;
                PRAGMA busy_timeout=5000;
                PRAGMA foreign_keys=ON;
                "#,
            )?,
        }
        Ok(())
    }

    /// Run `f` with shared access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction, committing on success and rolling back
    /// on error.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.config.storage_mode
    }

    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    /// Whether the configured path looks like it lives inside a cloud-synced
    /// folder. Used to warn, not to change behavior automatically.
    pub fn is_in_cloud_folder(&self) -> bool {
        let path = self.config.db_path.to_lowercase();
        path.contains("dropbox")
            || path.contains("onedrive")
            || path.contains("icloud")
            || path.contains("google drive")
    }

    pub fn storage_mode_warning(&self) -> Option<String> {
        if self.is_in_cloud_folder() && self.config.storage_mode == StorageMode::Local {
            Some(format!(
                "database '{}' appears to be in a cloud-synced folder; WAL mode may corrupt \
                 across concurrent sync writes. Set MEMNESIS_STORAGE_MODE=cloud-safe or move it.",
                self.config.db_path
            ))
        } else {
            None
        }
    }

    /// Force a WAL checkpoint, flushing the write-ahead log into the main
    /// database file. A no-op in cloud-safe mode, which has no WAL.
    pub fn checkpoint(&self) -> Result<()> {
        if self.config.storage_mode == StorageMode::Local {
            self.with_connection(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Run SQLite's `VACUUM` to reclaim space after bulk deletes.
    pub fn vacuum(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations() {
        let storage = Storage::open_in_memory().unwrap();
        let count = storage
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='memories'",
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();
        let res: Result<()> = storage.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO memories (id, content, memory_type, importance, created_at, \
                 accessed_at, access_count, surface_count, validated, status, metadata) \
                 VALUES ('mem_x', 'x', 'fact', 0.5, '2024-01-01T00:00:00Z', \
                 '2024-01-01T00:00:00Z', 0, 0, 0, 'active', '{}')",
                [],
            )?;
            Err(crate::error::MemoryError::Validation("boom".into()))
        });
        assert!(res.is_err());
        let count = storage
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memories", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn detects_cloud_folder_by_path() {
        let config = StorageConfig {
            db_path: "/Users/test/Dropbox/memnesis/memories.db".to_string(),
            storage_mode: StorageMode::Local,
        };
        assert!(config.db_path.to_lowercase().contains("dropbox"));
    }
}

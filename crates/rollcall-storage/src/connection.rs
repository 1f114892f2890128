//! Connection pool for the attendance store.
//!
//! The engine writes from several places at once (ingest worker, reconciler,
//! enrollment sessions), but SQLite admits a single writer. WAL mode lets
//! readers proceed during a write and the busy timeout queues competing
//! writers instead of failing them with `SQLITE_BUSY`.

use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// A database file; missing parent directories are created
    File(PathBuf),
    /// A private in-memory database, gone when the pool closes
    Memory,
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseLocation::File(path) => write!(f, "{}", path.display()),
            DatabaseLocation::Memory => f.write_str(":memory:"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: DatabaseLocation,
    /// Pool size; forced to 1 for in-memory stores
    pub pool_size: u32,
    /// How long a writer waits for the lock held by another writer
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection
    pub acquire_timeout: Duration,
    /// Apply pending migrations when opening
    pub migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::file("rollcall.db")
    }
}

impl DatabaseConfig {
    /// A database file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            pool_size: 8,
            busy_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(30),
            migrate: true,
        }
    }

    pub fn memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            pool_size: 1,
            ..Self::file("")
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = match &self.location {
            DatabaseLocation::File(path) => {
                ensure_parent_dir(path)?;
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
            }
            DatabaseLocation::Memory => SqliteConnectOptions::new().in_memory(true),
        };
        Ok(options
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging())
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let pool = SqlitePoolOptions::new().acquire_timeout(self.acquire_timeout);
        match self.location {
            // every connection to `:memory:` is its own empty database, so
            // the one connection must never be closed or recycled
            DatabaseLocation::Memory => pool
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            DatabaseLocation::File(_) => pool.max_connections(self.pool_size),
        }
    }
}

fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::Configuration(format!("cannot create {}: {e}", parent.display()))),
        _ => Ok(()),
    }
}

/// Shared handle to the store; clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the store described by `config`, migrating it unless disabled.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rollcall_storage::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(DatabaseConfig::file("/var/lib/rollcall/rollcall.db").pool_size(4)).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns `Configuration` if the directory cannot be created, otherwise
    /// the connection or migration error.
    pub async fn open(config: DatabaseConfig) -> StorageResult<Self> {
        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await?;
        let db = Self { pool };
        if config.migrate {
            db.migrate().await?;
        }
        tracing::info!(location = %config.location, "Database opened");
        Ok(db)
    }

    /// Migrated in-memory store.
    ///
    /// # Errors
    /// Returns the connection or migration error.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::open(DatabaseConfig::memory()).await
    }

    /// Apply the migrations in the workspace `migrations/` directory.
    ///
    /// # Errors
    /// Fails if a migration fails or an applied one was edited afterwards.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_single_connection() {
        let config = DatabaseConfig::memory().pool_size(6);
        assert_eq!(config.location, DatabaseLocation::Memory);
        assert_eq!(config.pool_options().get_max_connections(), 1);
        assert_eq!(config.location.to_string(), ":memory:");
    }

    #[test]
    fn test_file_config_setters() {
        let config = DatabaseConfig::file("data/rollcall.db")
            .pool_size(0)
            .busy_timeout(Duration::from_secs(2))
            .migrate(false);

        assert_eq!(config.location, DatabaseLocation::File(PathBuf::from("data/rollcall.db")));
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.busy_timeout, Duration::from_secs(2));
        assert!(!config.migrate);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/rollcall.db");
        let db = Database::open(DatabaseConfig::file(&path)).await.unwrap();
        db.health_check().await.unwrap();
        assert!(path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let db = Database::in_memory().await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('devices', 'enrollment_sessions', 'attendance_events', 'event_cursors')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, 4);
    }
}

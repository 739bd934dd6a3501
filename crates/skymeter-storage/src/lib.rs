//! Skymeter Gateway Storage
//!
//! Storage backend abstraction for the gateway's account and plan data.
//! The backend object is the injected store handle: constructed once at
//! service start and shared (via `Arc`) with every component that touches
//! persistent state.

use skymeter_core::{init_sqlite_schema, GatewayError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Backend abstraction for gateway storage
///
/// Implementations hand out configured connections to the durable keyed
/// store holding accounts and plans. There is no process-wide singleton;
/// callers receive the backend explicitly.
pub trait GatewayBackend: Send + Sync {
    /// Get a connection to the gateway database
    ///
    /// Connections come back with foreign keys enforced and a busy timeout
    /// set, so concurrent writers queue on the SQLite write lock instead of
    /// failing immediately. The schema is initialized if needed.
    fn get_connection(&self) -> Result<Connection>;

    /// Check if the database exists
    fn exists(&self) -> Result<bool>;

    /// Initialize a new database (create the file and schema)
    fn initialize(&self) -> Result<()>;
}

/// Local filesystem SQLite backend
///
/// Stores accounts and plans as a SQLite file on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalSqliteBackend {
    /// Path to the SQLite database file
    path: PathBuf,
}

impl LocalSqliteBackend {
    /// Create a new local SQLite backend
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Example
    /// ```
    /// use skymeter_storage::LocalSqliteBackend;
    ///
    /// let backend = LocalSqliteBackend::new("skymeter.db");
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn configure(conn: &Connection) -> Result<()> {
        // busy_timeout makes concurrent check-then-increment transactions
        // wait for the writer lock rather than surface SQLITE_BUSY
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }
}

impl GatewayBackend for LocalSqliteBackend {
    fn get_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        Self::configure(&conn)?;

        // Initialize schema if needed (idempotent)
        init_sqlite_schema(&conn)?;

        Ok(conn)
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn initialize(&self) -> Result<()> {
        if self.exists()? {
            return Err(GatewayError::Other(format!(
                "database already exists at {:?}",
                self.path
            )));
        }

        let conn = Connection::open(&self.path)?;
        Self::configure(&conn)?;
        init_sqlite_schema(&conn)?;

        Ok(())
    }
}

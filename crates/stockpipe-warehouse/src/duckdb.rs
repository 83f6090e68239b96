//! Pooled `DuckDB` connections.
//!
//! The database file is opened once per pool; every leased connection is a
//! clone of that root handle, so all of them share one database instance.
//! Idle clones are kept per access mode so the loader and the indicator stages
//! do not pay connection setup for every batch.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::duckdb::Connection;

/// Access mode requested when leasing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only. Used by reports and guarded ad-hoc SQL.
    ReadOnly,
    /// Imports and indicator write-back.
    ReadWrite,
}

impl AccessMode {
    const fn slot(self) -> usize {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 1,
        }
    }
}

struct PoolShared {
    db_path: PathBuf,
    max_idle: usize,
    root: Mutex<Option<Connection>>,
    idle: Mutex<[Vec<Connection>; 2]>,
}

// Neither mutex guards state that a panic elsewhere can leave half-written.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PoolShared {
    fn clone_root(&self) -> Result<Connection, ::duckdb::Error> {
        let mut root = relock(&self.root);
        if let Some(connection) = root.as_ref() {
            return connection.try_clone();
        }

        let connection = Connection::open(self.db_path.as_path())?;
        connection.execute_batch("PRAGMA disable_progress_bar;")?;
        let leased = connection.try_clone()?;
        *root = Some(connection);
        Ok(leased)
    }
}

/// Connection pool for a single warehouse file.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool for `path` keeping at most `max_idle` idle connections per mode.
    ///
    /// The file is not touched until the first lease.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_idle: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                db_path: path.into(),
                max_idle: max_idle.max(1),
                root: Mutex::new(None),
                idle: Mutex::new([Vec::new(), Vec::new()]),
            }),
        }
    }

    /// Lease a connection, reusing an idle one when available.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or the root
    /// connection cannot be cloned.
    pub fn lease(&self, mode: AccessMode) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = relock(&self.shared.idle)[mode.slot()].pop();

        let connection = match reused {
            Some(connection) => connection,
            None => self.shared.clone_root()?,
        };

        Ok(PooledConnection {
            mode,
            shared: Arc::clone(&self.shared),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.shared.db_path.as_path()
    }

    /// Number of idle connections currently held for `mode`.
    #[must_use]
    pub fn idle_count(&self, mode: AccessMode) -> usize {
        relock(&self.shared.idle)[mode.slot()].len()
    }
}

/// A leased connection; returned to the pool on drop.
pub struct PooledConnection {
    mode: AccessMode,
    shared: Arc<PoolShared>,
    connection: Option<Connection>,
}

impl PooledConnection {
    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("connection is only taken in drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("connection is only taken in drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = relock(&self.shared.idle);
        let slot = &mut idle[self.mode.slot()];
        if slot.len() < self.shared.max_idle {
            slot.push(connection);
        }
    }
}

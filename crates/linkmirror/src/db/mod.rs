//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use rusqlite::Connection;

pub mod error;
pub mod migrations;
pub mod shared_link_repo;

pub use error::DatabaseError;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). The producer and every worker share one
/// handle; SQLite serializes writes anyway. WAL mode is enabled so readers
/// outside this process are not blocked by the reconciler.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Like [`Database::with_conn`], but bounded by `timeout`, which covers
    /// waiting for the connection as well as running `f`. A statement still
    /// running at the deadline is interrupted; either way the call fails
    /// with [`DatabaseError::Timeout`].
    pub fn with_conn_timeout<F, T>(&self, timeout: Duration, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let deadline = Instant::now() + timeout;
        let conn = loop {
            match self.conn.try_lock() {
                Ok(conn) => break conn,
                Err(TryLockError::Poisoned(_)) => return Err(DatabaseError::LockPoisoned),
                Err(TryLockError::WouldBlock) if Instant::now() >= deadline => {
                    return Err(DatabaseError::Timeout(timeout));
                }
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_POLL_INTERVAL),
            }
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        let interrupt = conn.get_interrupt_handle();

        // Dropping `done_tx` wakes the watchdog before the deadline.
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let watchdog = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(remaining) {
                interrupt.interrupt();
            }
        });

        let result = f(&conn);

        drop(done_tx);
        if watchdog.join().is_err() {
            log::warn!("Query watchdog thread panicked");
        }

        result.map_err(|e| match e {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(ref inner, _))
                if inner.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                DatabaseError::Timeout(timeout)
            }
            other => other,
        })
    }
}

/// Returns the canonical database path: `~/.linkmirror/data/linkmirror.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".linkmirror").join("data").join("linkmirror.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM shared_links", [], |r| r.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.ends_with("linkmirror.db"));
        assert!(path.to_string_lossy().contains(".linkmirror"));
    }

    #[test]
    fn test_database_is_clone() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO shared_links (user_id, state, host, created_at, updated_at,
                 original_link) VALUES ('u1', 'pending', 'h', 0, 0, 'https://x')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db2.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM shared_links", [], |r| r.get(0))?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_with_conn_timeout_interrupts_runaway_query() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn_timeout(Duration::from_millis(50), |conn| {
                let n: i64 = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                     SELECT COUNT(*) FROM c",
                    [],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Timeout(_)), "got {err:?}");
        assert!(err.is_transient());
    }

    #[test]
    fn test_with_conn_timeout_counts_time_waiting_for_the_connection() {
        let db = Database::open_in_memory().unwrap();
        let holder = db.clone();
        let (locked_tx, locked_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::spawn(move || {
            holder
                .with_conn(|_| {
                    locked_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(500));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let err = db
            .with_conn_timeout(Duration::from_millis(100), |conn| {
                Ok(conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?)
            })
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Timeout(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_millis(400));
        handle.join().unwrap();
    }

    #[test]
    fn test_with_conn_timeout_passes_fast_query() {
        let db = Database::open_in_memory().unwrap();
        let n = db
            .with_conn_timeout(Duration::from_secs(5), |conn| {
                Ok(conn.query_row("SELECT 41 + 1", [], |r| r.get::<_, i64>(0))?)
            })
            .unwrap();
        assert_eq!(n, 42);
        // The connection is still usable after the watchdog is disarmed.
        db.with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?))
            .unwrap();
    }
}

//! The single producer: tails the store with the keyset cursor and feeds
//! due jobs into the bounded queue.

use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{select, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::db::shared_link_repo::{self, Cursor, ScanWindow, SharedLink};
use crate::db::{Database, DatabaseError};

/// Result of one scan-and-push cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// This many jobs were pushed onto the queue.
    Offered(usize),
    /// A stop was requested (or every worker is gone) while pushing.
    Stopped,
}

pub struct Producer {
    db: Database,
    queue: Sender<SharedLink>,
    stop: Receiver<()>,
    cursor: Cursor,
    batch_size: usize,
    max_running_age: Duration,
    query_timeout: Duration,
    idle_interval: Duration,
}

impl Producer {
    /// Creates a producer starting from [`Cursor::start`]. The scan batch
    /// size is the queue's capacity.
    pub fn new(
        db: Database,
        queue: Sender<SharedLink>,
        stop: Receiver<()>,
        max_running_age: Duration,
        query_timeout: Duration,
        idle_interval: Duration,
    ) -> Self {
        let batch_size = queue.capacity().unwrap_or(1).max(1);
        Self {
            db,
            queue,
            stop,
            cursor: Cursor::start(),
            batch_size,
            max_running_age,
            query_timeout,
            idle_interval,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Runs one scan and pushes every returned job, blocking while the
    /// queue is full. The cursor only moves when the scan returned jobs.
    pub fn sweep(&mut self) -> Result<Sweep, DatabaseError> {
        let window = ScanWindow {
            now: Utc::now(),
            max_running_age: self.max_running_age,
            query_timeout: self.query_timeout,
        };
        let (jobs, next) =
            shared_link_repo::find_reconcilable(&self.db, self.cursor, self.batch_size, &window)?;
        self.cursor = next;

        let count = jobs.len();
        for job in jobs {
            select! {
                send(self.queue, job) -> sent => {
                    if sent.is_err() {
                        return Ok(Sweep::Stopped);
                    }
                }
                recv(self.stop) -> _ => return Ok(Sweep::Stopped),
            }
        }
        Ok(Sweep::Offered(count))
    }

    /// Sweeps until stopped, pausing `idle_interval` after an empty or
    /// failed scan.
    pub fn run(mut self) {
        debug!(batch_size = self.batch_size, "Producer started");

        loop {
            match self.sweep() {
                Ok(Sweep::Stopped) => break,
                Ok(Sweep::Offered(0)) => {}
                Ok(Sweep::Offered(count)) => {
                    debug!(
                        count,
                        cursor_updated_at = %self.cursor.updated_at,
                        cursor_auto_id = self.cursor.auto_id,
                        "Queued reconcilable jobs"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, transient = e.is_transient(), "Reconcile scan failed");
                }
            }

            match self.stop.recv_timeout(self.idle_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        }

        info!("Producer stopped");
    }
}

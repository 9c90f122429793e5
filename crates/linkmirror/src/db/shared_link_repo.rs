//! Shared-link repository: the reconcile scan and the single-row writes
//! for the `shared_links` table.
//!
//! Timestamps are stored as Unix milliseconds. Every write bumps
//! `updated_at` (never backwards) and only touches rows that are still
//! `pending` or `created`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::link;
use crate::share::{ShareState, ShareStatus};

impl ToSql for ShareState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ShareState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let idx = row.as_ref().column_index(column)?;
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

/// A persisted shared-link job.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedLink {
    pub auto_id: i64,
    pub user_id: String,
    pub state: ShareState,
    pub host: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size: i64,
    pub visitor: i32,
    pub stored: i32,
    pub last_visited_at: DateTime<Utc>,
    pub last_stored_at: DateTime<Utc>,
    pub revenue: i64,
    pub title: String,
    pub original_link_hash: String,
    pub host_shared_link_hash: String,
    pub original_link: String,
    pub host_shared_link: String,
    pub error: Option<String>,
}

impl SharedLink {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            auto_id: row.get("auto_id")?,
            user_id: row.get("user_id")?,
            state: row.get("state")?,
            host: row.get("host")?,
            created_by: row.get("created_by")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
            size: row.get("size")?,
            visitor: row.get("visitor")?,
            stored: row.get("stored")?,
            last_visited_at: timestamp(row, "last_visited_at")?,
            last_stored_at: timestamp(row, "last_stored_at")?,
            revenue: row.get("revenue")?,
            title: row.get("title")?,
            original_link_hash: row.get("original_link_hash")?,
            host_shared_link_hash: row.get("host_shared_link_hash")?,
            original_link: row.get("original_link")?,
            host_shared_link: row.get("host_shared_link")?,
            error: row.get("error")?,
        })
    }

    /// The scan position just past this job.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            updated_at: self.updated_at,
            auto_id: self.auto_id,
        }
    }
}

/// A job as archived into `shared_links_complete` once terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSharedLink {
    pub link: SharedLink,
    pub first_visited_at: DateTime<Utc>,
}

/// A job submitted by the upstream submission path.
#[derive(Debug, Clone)]
pub struct NewSharedLink {
    pub user_id: String,
    pub host: String,
    pub created_by: String,
    pub original_link: String,
    pub state: ShareState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewSharedLink {
    /// A freshly submitted `pending` job, created and last touched at `now`.
    pub fn pending(
        user_id: impl Into<String>,
        host: impl Into<String>,
        created_by: impl Into<String>,
        original_link: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            host: host.into(),
            created_by: created_by.into(),
            original_link: original_link.into(),
            state: ShareState::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Keyset position of the reconcile scan: `(updated_at, auto_id)`.
///
/// Field order matters: the derived ordering is the tuple ordering the
/// scan predicate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub updated_at: DateTime<Utc>,
    pub auto_id: i64,
}

impl Cursor {
    /// The position before every job (the Unix epoch, id 0).
    pub fn start() -> Self {
        Self {
            updated_at: DateTime::<Utc>::default(),
            auto_id: 0,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

/// Time parameters of one reconcile scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanWindow {
    /// Reference time for the freshness and backoff filters.
    pub now: DateTime<Utc>,
    /// Jobs created longer ago than this are no longer scanned.
    pub max_running_age: Duration,
    /// Deadline for the scan query itself.
    pub query_timeout: Duration,
}

impl ScanWindow {
    fn oldest_created_at(&self) -> i64 {
        let age = i64::try_from(self.max_running_age.as_millis()).unwrap_or(i64::MAX);
        self.now.timestamp_millis().saturating_sub(age)
    }
}

const FIND_RECONCILABLE_SQL: &str = "SELECT * FROM shared_links
     WHERE state IN (?1, ?2)
       AND (updated_at, auto_id) > (?3, ?4)
       AND created_at > ?5
       AND (?6 - updated_at) * 60 > (updated_at - created_at)
     ORDER BY state = ?2 DESC, updated_at ASC, auto_id ASC
     LIMIT ?7";

/// Returns up to `limit` jobs that are due for reconciliation after
/// `cursor`, plus the cursor to resume from.
///
/// A job is due when it is `pending` or `created`, sits strictly after the
/// cursor in `(updated_at, auto_id)` order, was created within the
/// window's running age, and has been idle for more than 1/60th of the
/// time between its creation and its last update. `created` jobs come
/// first, then oldest update first. An empty batch returns `cursor`
/// unchanged.
pub fn find_reconcilable(
    db: &Database,
    cursor: Cursor,
    limit: usize,
    window: &ScanWindow,
) -> Result<(Vec<SharedLink>, Cursor), DatabaseError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = db.with_conn_timeout(window.query_timeout, |conn| {
        let mut stmt = conn.prepare_cached(FIND_RECONCILABLE_SQL)?;
        let rows = stmt
            .query_map(
                params![
                    ShareState::Pending,
                    ShareState::Created,
                    cursor.updated_at.timestamp_millis(),
                    cursor.auto_id,
                    window.oldest_created_at(),
                    window.now.timestamp_millis(),
                    limit,
                ],
                SharedLink::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let next = rows.last().map(SharedLink::cursor).unwrap_or(cursor);
    Ok((rows, next))
}

/// Inserts a new job and returns its `auto_id`.
pub fn insert(db: &Database, job: &NewSharedLink) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO shared_links (user_id, state, host, created_by, created_at, updated_at,
             original_link_hash, original_link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.user_id,
                job.state,
                job.host,
                job.created_by,
                job.created_at.timestamp_millis(),
                job.updated_at.timestamp_millis(),
                link::hash(&job.original_link),
                job.original_link,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its `auto_id`.
pub fn find_by_id(db: &Database, auto_id: i64) -> Result<Option<SharedLink>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM shared_links WHERE auto_id = ?1",
                params![auto_id],
                SharedLink::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts jobs in the given state.
pub fn count_by_state(db: &Database, state: ShareState) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM shared_links WHERE state = ?1",
            params![state],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Overwrites a job with the host's current view: state, creator, usage,
/// title, hosted link and both link hashes.
///
/// Returns `false` when the job no longer exists or is already terminal.
pub fn apply_status(
    db: &Database,
    job: &SharedLink,
    status: &ShareStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE shared_links SET state = ?2, created_by = ?3,
             updated_at = MAX(updated_at, ?4), size = ?5, visitor = ?6, stored = ?7,
             revenue = ?8, title = ?9, original_link_hash = ?10,
             host_shared_link_hash = ?11, original_link = ?12, host_shared_link = ?13
             WHERE auto_id = ?1 AND state IN (?14, ?15)",
            params![
                job.auto_id,
                status.state,
                status.created_by,
                now.timestamp_millis(),
                status.size,
                status.visitor,
                status.stored,
                status.revenue,
                status.title,
                link::hash(&job.original_link),
                link::hash(&status.host_shared_link),
                job.original_link,
                status.host_shared_link,
                ShareState::Pending,
                ShareState::Created,
            ],
        )?;
        if changed > 0 && status.state.is_terminal() {
            archive(&tx, job.auto_id)?;
        }
        tx.commit()?;
        Ok(changed > 0)
    })
}

/// Sets only `state` (and bumps `updated_at`).
///
/// Returns `false` when the job no longer exists or is already terminal.
pub fn update_state(
    db: &Database,
    auto_id: i64,
    state: ShareState,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE shared_links SET state = ?2, updated_at = MAX(updated_at, ?3)
             WHERE auto_id = ?1 AND state IN (?4, ?5)",
            params![
                auto_id,
                state,
                now.timestamp_millis(),
                ShareState::Pending,
                ShareState::Created,
            ],
        )?;
        if changed > 0 && state.is_terminal() {
            archive(&tx, auto_id)?;
        }
        tx.commit()?;
        Ok(changed > 0)
    })
}

/// Heartbeat: bumps only `updated_at` so the job moves past the scan
/// cursor without changing anything else.
///
/// Returns `false` when the job no longer exists or is already terminal.
pub fn touch(db: &Database, auto_id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE shared_links SET updated_at = MAX(updated_at, ?2)
             WHERE auto_id = ?1 AND state IN (?3, ?4)",
            params![
                auto_id,
                now.timestamp_millis(),
                ShareState::Pending,
                ShareState::Created,
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Copies a (now terminal) job into `shared_links_complete`, replacing an
/// earlier completion of the same `(user_id, host, original_link_hash)`.
fn archive(conn: &Connection, auto_id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO shared_links_complete (auto_id, user_id, state, host, created_by,
         created_at, updated_at, size, visitor, stored, first_visited_at, last_visited_at,
         last_stored_at, revenue, title, original_link_hash, host_shared_link_hash,
         original_link, host_shared_link, error)
         SELECT auto_id, user_id, state, host, created_by, created_at, updated_at, size,
         visitor, stored, updated_at, last_visited_at, last_stored_at, revenue, title,
         original_link_hash, host_shared_link_hash, original_link, host_shared_link, error
         FROM shared_links WHERE auto_id = ?1
         ON CONFLICT (user_id, host, original_link_hash) DO UPDATE SET
         auto_id = excluded.auto_id, state = excluded.state,
         created_by = excluded.created_by, created_at = excluded.created_at,
         updated_at = excluded.updated_at, size = excluded.size,
         visitor = excluded.visitor, stored = excluded.stored,
         last_visited_at = excluded.last_visited_at,
         last_stored_at = excluded.last_stored_at, revenue = excluded.revenue,
         title = excluded.title, host_shared_link_hash = excluded.host_shared_link_hash,
         original_link = excluded.original_link,
         host_shared_link = excluded.host_shared_link, error = excluded.error",
        params![auto_id],
    )?;
    Ok(())
}

/// Finds the archived completion of a link, if any.
pub fn find_complete(
    db: &Database,
    user_id: &str,
    host: &str,
    original_link_hash: &str,
) -> Result<Option<CompletedSharedLink>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM shared_links_complete
                 WHERE user_id = ?1 AND host = ?2 AND original_link_hash = ?3",
                params![user_id, host, original_link_hash],
                |row| {
                    Ok(CompletedSharedLink {
                        link: SharedLink::from_row(row)?,
                        first_visited_at: timestamp(row, "first_visited_at")?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

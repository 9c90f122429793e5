//! Isolated store + hosts + runtime for running the whole pipeline.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use tempfile::TempDir;
use tokio::runtime::Runtime;

use linkmirror::db::shared_link_repo::{self, NewSharedLink, SharedLink};
use linkmirror::{Database, HostRegistry, MemoryHost, Reconciler, ReconcilerSettings};

pub const USER: &str = "user-1";

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    runtime: Runtime,
    hosts: HostRegistry,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("linkmirror.db"))
            .expect("Failed to open database");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");

        Self {
            temp_dir,
            db,
            runtime,
            hosts: HostRegistry::new(),
        }
    }

    /// Registers `host` and hands it back for scripting and inspection.
    pub fn with_host(&mut self, host: MemoryHost) -> Arc<MemoryHost> {
        let host = Arc::new(host);
        self.hosts.register(host.clone());
        host
    }

    /// Fast-ticking settings so tests don't wait on the production idle
    /// interval.
    pub fn settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            queue_capacity: 64,
            worker_count: 4,
            max_running_age: Duration::from_secs(7 * 24 * 60 * 60),
            age_out: Duration::from_secs(48 * 60 * 60),
            query_timeout: Duration::from_secs(10),
            idle_interval: Duration::from_millis(20),
        }
    }

    pub fn start(&self, settings: ReconcilerSettings) -> Reconciler {
        Reconciler::start(
            settings,
            self.db.clone(),
            Arc::new(self.hosts.clone()),
            self.runtime.handle().clone(),
        )
        .expect("Failed to start reconciler")
    }

    /// Inserts a `pending` job submitted `created_ago` before now.
    pub fn submit(&self, host: &str, link: &str, created_ago: TimeDelta) -> i64 {
        let at = Utc::now() - created_ago;
        shared_link_repo::insert(&self.db, &NewSharedLink::pending(USER, host, "api", link, at))
            .expect("Failed to insert job")
    }

    pub fn job(&self, auto_id: i64) -> SharedLink {
        shared_link_repo::find_by_id(&self.db, auto_id)
            .expect("Failed to load job")
            .expect("Job not found")
    }

    /// Polls `cond` until it holds or `timeout` runs out.
    pub fn wait_until<F>(&self, timeout: Duration, mut cond: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if cond(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

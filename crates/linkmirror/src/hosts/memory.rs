//! In-process host that keeps its mirrors in memory.
//!
//! Useful for tests and local dry runs: it honours the idempotency contract
//! of [`Host::ensure_mirror`] and lets the caller script what state each
//! mirror reports.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{Host, HostError};
use crate::share::{ShareState, ShareStatus};

#[derive(Debug)]
struct Mirrors {
    by_link: HashMap<(String, String), ShareStatus>,
    default_state: ShareState,
    failing: bool,
    calls: usize,
}

pub struct MemoryHost {
    name: String,
    mirrors: Mutex<Mirrors>,
}

impl MemoryHost {
    /// A host whose new mirrors report `created`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mirrors: Mutex::new(Mirrors {
                by_link: HashMap::new(),
                default_state: ShareState::Created,
                failing: false,
                calls: 0,
            }),
        }
    }

    /// State reported by mirrors created from now on.
    pub fn with_default_state(self, state: ShareState) -> Self {
        self.lock().default_state = state;
        self
    }

    /// Changes (or seeds) the status of one mirror.
    pub fn update<F>(&self, user_id: &str, original_link: &str, f: F)
    where
        F: FnOnce(&mut ShareStatus),
    {
        let mut mirrors = self.lock();
        let status = mirrors.entry(&self.name, user_id, original_link, "");
        f(status);
    }

    /// Makes every call fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Number of `ensure_mirror` calls so far.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Number of distinct mirrors created so far.
    pub fn mirror_count(&self) -> usize {
        self.lock().by_link.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mirrors> {
        self.mirrors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Mirrors {
    fn entry(
        &mut self,
        host: &str,
        user_id: &str,
        original_link: &str,
        requested_by: &str,
    ) -> &mut ShareStatus {
        let next_id = self.by_link.len() + 1;
        let state = self.default_state;
        self.by_link
            .entry((user_id.to_string(), original_link.to_string()))
            .or_insert_with(|| ShareStatus {
                state,
                created_by: requested_by.to_string(),
                size: 0,
                visitor: 0,
                stored: 0,
                revenue: 0,
                title: original_link.to_string(),
                created_at: Utc::now(),
                host_shared_link: format!("memory://{host}/s/{next_id}"),
            })
    }
}

#[async_trait]
impl Host for MemoryHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_mirror(
        &self,
        user_id: &str,
        original_link: &str,
        requested_by: &str,
    ) -> Result<ShareStatus, HostError> {
        let mut mirrors = self.lock();
        mirrors.calls += 1;
        if mirrors.failing {
            return Err(HostError::Other {
                host: self.name.clone(),
                message: "host unavailable".to_string(),
            });
        }
        Ok(mirrors
            .entry(&self.name, user_id, original_link, requested_by)
            .clone())
    }
}

//! Worker loop: asks the job's host for the mirror status and writes the
//! resulting transition back to the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{select, Receiver};
use tokio::runtime::Handle;
use tracing::{debug, debug_span, error, warn};

use super::policy::{self, Transition};
use crate::db::shared_link_repo::{self, SharedLink};
use crate::db::Database;
use crate::error::ReconcileError;
use crate::hosts::HostRegistry;
use crate::share::ShareState;

/// What a worker did with one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Failed for staying `created` past the age-out threshold.
    AgedOut,
    /// Overwritten with the host's view, now in this state.
    Applied(ShareState),
    /// Only `updated_at` was bumped.
    Heartbeat,
    /// The row went terminal (or away) before the write landed.
    Skipped,
}

pub struct Worker {
    id: usize,
    db: Database,
    hosts: Arc<HostRegistry>,
    runtime: Handle,
    age_out: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        db: Database,
        hosts: Arc<HostRegistry>,
        runtime: Handle,
        age_out: Duration,
    ) -> Self {
        Self {
            id,
            db,
            hosts,
            runtime,
            age_out,
        }
    }

    /// Reconciles one job. Must not be called from inside the runtime the
    /// worker was given, since the host call blocks on it.
    pub fn process(&self, job: &SharedLink) -> Result<Outcome, ReconcileError> {
        let host = self
            .hosts
            .get(&job.host)
            .ok_or_else(|| ReconcileError::UnknownHost(job.host.clone()))?;

        let status = self.runtime.block_on(host.ensure_mirror(
            &job.user_id,
            &job.original_link,
            &job.created_by,
        ))?;

        let now = Utc::now();
        let persist = |source| ReconcileError::Persist {
            auto_id: job.auto_id,
            source,
        };

        let (written, outcome) = match policy::decide(job, &status, now, self.age_out) {
            Transition::AgeOut => (
                shared_link_repo::update_state(&self.db, job.auto_id, ShareState::Error, now)
                    .map_err(persist)?,
                Outcome::AgedOut,
            ),
            Transition::Apply => (
                shared_link_repo::apply_status(&self.db, job, &status, now).map_err(persist)?,
                Outcome::Applied(status.state),
            ),
            Transition::Heartbeat => (
                shared_link_repo::touch(&self.db, job.auto_id, now).map_err(persist)?,
                Outcome::Heartbeat,
            ),
        };

        Ok(if written { outcome } else { Outcome::Skipped })
    }

    /// Takes jobs off the queue until stopped or the queue is closed.
    /// Failures are logged and the job is left for a later sweep.
    pub fn run(self, queue: Receiver<SharedLink>, stop: Receiver<()>) {
        debug!(worker = self.id, "Worker started");

        loop {
            let job = select! {
                recv(queue) -> job => match job {
                    Ok(job) => job,
                    Err(_) => {
                        debug!(worker = self.id, "Job queue disconnected");
                        break;
                    }
                },
                recv(stop) -> _ => break,
            };

            let _span =
                debug_span!("reconcile.job", worker = self.id, auto_id = job.auto_id, host = %job.host)
                    .entered();

            match self.process(&job) {
                Ok(outcome) => debug!(?outcome, "Job reconciled"),
                Err(e @ ReconcileError::Host(_)) => {
                    warn!(user_id = %job.user_id, error = %e, "Host call failed")
                }
                Err(e) => error!(user_id = %job.user_id, error = %e, "Job dropped"),
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }
}

//! The reconcile pipeline: one producer tailing the store, a fixed pool of
//! workers, and a bounded queue between them.

pub mod policy;
pub mod producer;
pub mod worker;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::config::ReconcilerConfig;
use crate::db::shared_link_repo::SharedLink;
use crate::db::Database;
use crate::error::{LinkMirrorError, Result};
use crate::hosts::HostRegistry;

pub use policy::{decide, Transition};
pub use producer::{Producer, Sweep};
pub use worker::{Outcome, Worker};

/// Knobs for one pipeline instance.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub max_running_age: Duration,
    pub age_out: Duration,
    pub query_timeout: Duration,
    pub idle_interval: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            worker_count: config.worker_count,
            max_running_age: config.max_running_age(),
            age_out: config.age_out(),
            query_timeout: config.query_timeout(),
            idle_interval: config.idle_interval(),
        }
    }
}

/// A running pipeline. Dropping it without [`Reconciler::stop`] leaves the
/// threads running until the process exits.
pub struct Reconciler {
    stop: Mutex<Option<Sender<()>>>,
    threads: Vec<(String, JoinHandle<()>)>,
}

impl Reconciler {
    /// Spawns the producer and `worker_count` workers. A zero queue
    /// capacity or worker count is raised to one, since either would leave
    /// the producer blocked forever.
    ///
    /// Host calls are driven on `runtime`, which must outlive the pipeline.
    pub fn start(
        settings: ReconcilerSettings,
        db: Database,
        hosts: Arc<HostRegistry>,
        runtime: Handle,
    ) -> Result<Self> {
        let worker_count = settings.worker_count.max(1);
        let (queue_tx, queue_rx) = bounded::<SharedLink>(settings.queue_capacity.max(1));
        // Never sent on: dropping the sender wakes every loop at once.
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let mut reconciler = Self {
            stop: Mutex::new(Some(stop_tx)),
            threads: Vec::with_capacity(worker_count + 1),
        };

        for id in 0..worker_count {
            let worker = Worker::new(
                id,
                db.clone(),
                Arc::clone(&hosts),
                runtime.clone(),
                settings.age_out,
            );
            let (queue, stop) = (queue_rx.clone(), stop_rx.clone());
            reconciler.spawn(format!("reconcile-worker-{id}"), move || {
                worker.run(queue, stop)
            })?;
        }

        let producer = Producer::new(
            db,
            queue_tx,
            stop_rx,
            settings.max_running_age,
            settings.query_timeout,
            settings.idle_interval,
        );
        reconciler.spawn("reconcile-producer".to_string(), move || producer.run())?;

        info!(
            workers = worker_count,
            queue_capacity = settings.queue_capacity,
            hosts = ?hosts.names(),
            "Reconciler started"
        );

        Ok(reconciler)
    }

    fn spawn<F>(&mut self, name: String, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|source| {
                // Don't leave the threads spawned so far running.
                self.stop();
                LinkMirrorError::Spawn {
                    name: name.clone(),
                    source,
                }
            })?;
        self.threads.push((name, handle));
        Ok(())
    }

    /// Tells every loop to exit. Jobs still queued are abandoned; they are
    /// picked up again by the next scan after a restart.
    pub fn stop(&self) {
        let sender = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            info!("Stopping reconciler...");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Blocks until every thread has exited. Call [`Reconciler::stop`] first.
    pub fn wait(self) {
        for (name, handle) in self.threads {
            if let Err(e) = handle.join() {
                error!(thread = %name, "Reconciler thread panicked: {:?}", e);
            } else {
                debug!(thread = %name, "Reconciler thread finished");
            }
        }

        info!("Reconciler stopped");
    }
}

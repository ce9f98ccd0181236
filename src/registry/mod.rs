//! Client-local registry of training jobs.
//!
//! Jobs appear here the moment the user asks for a model, before the server has confirmed
//! anything. The whole collection is written to the [`JobStore`] after every mutation and read
//! back when the registry is built.

use crate::task::ScheduledTask;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub mod job;
pub mod simulation;
pub mod store;

pub use job::{new_job_id, TrainingJob, TrainingStatus};
pub use simulation::SimulationConfig;
pub use store::{FileJobStore, JobStore, MemoryJobStore, StoreError};

/// Highest progress a job may show before it is completed.
const MAX_UNFINISHED_PROGRESS: f32 = 99.9;

#[derive(Clone)]
pub struct TrainingJobRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    jobs: Mutex<Vec<TrainingJob>>,
    store: Box<dyn JobStore>,
    simulation: Option<SimulationConfig>,
    tickers: Mutex<HashMap<String, ScheduledTask>>,
}

impl TrainingJobRegistry {
    /// Rehydrate from `store`. Unreadable contents start an empty registry.
    pub fn new(store: Box<dyn JobStore>, simulation: Option<SimulationConfig>) -> Self {
        let jobs = match store.load() {
            Ok(jobs) => {
                tracing::info!("Loaded {} training jobs", jobs.len());
                jobs
            }
            Err(e) => {
                tracing::error!("Failed to load training jobs, starting empty: {}", e);
                Vec::new()
            }
        };

        Self {
            inner: Arc::new(RegistryInner {
                jobs: Mutex::new(jobs),
                store,
                simulation,
                tickers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn in_memory(simulation: Option<SimulationConfig>) -> Self {
        Self::new(Box::new(MemoryJobStore::new()), simulation)
    }

    /// Insert a queued job at the front and return its id.
    ///
    /// With simulation enabled and a tokio runtime available, a ticker starts advancing the job.
    pub fn create_job(&self, name: &str) -> String {
        let job = TrainingJob::new(name.trim());
        let id = job.id.clone();

        {
            let mut jobs = self.inner.jobs.lock();
            jobs.insert(0, job);
            self.inner.persist(&jobs);
        }
        tracing::info!("Created training job {} ('{}')", id, name.trim());

        if let Some(config) = self.inner.simulation {
            self.start_simulation(&id, config);
        }

        id
    }

    /// Set progress and status of `id`. Returns false when nothing changed.
    ///
    /// Unknown ids and jobs already in a terminal state are left alone. `completed_at` is
    /// stamped on the transition into a terminal state; only `Completed` reaches 100.
    pub fn update_job(&self, id: &str, progress: f32, status: TrainingStatus) -> bool {
        self.apply_update(id, |_| (progress, status))
    }

    /// Like [`update_job`](Self::update_job), with the new values computed from the stored
    /// progress while the lock is held.
    fn apply_update(&self, id: &str, next: impl FnOnce(f32) -> (f32, TrainingStatus)) -> bool {
        let applied = {
            let mut jobs = self.inner.jobs.lock();
            let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
                tracing::debug!("Ignoring update for unknown training job {}", id);
                return false;
            };

            if job.status.is_terminal() {
                tracing::debug!(
                    "Ignoring update for training job {} already {:?}",
                    id,
                    job.status
                );
                None
            } else {
                let (progress, status) = next(job.progress);
                job.progress = normalize_progress(progress, job.progress, status);
                job.status = status;
                if status.is_terminal() {
                    job.completed_at = Some(Utc::now());
                    tracing::info!("Training job {} finished: {:?}", id, status);
                }
                self.inner.persist(&jobs);
                Some(status)
            }
        };

        match applied {
            Some(status) => {
                if status.is_terminal() {
                    self.stop_simulation(id);
                }
                true
            }
            None => false,
        }
    }

    pub fn get_job(&self, id: &str) -> Option<TrainingJob> {
        self.inner.jobs.lock().iter().find(|job| job.id == id).cloned()
    }

    /// Newest first.
    pub fn list_jobs(&self) -> Vec<TrainingJob> {
        self.inner.jobs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.lock().is_empty()
    }

    /// Record that local job `id` is backed by server job `server_job_id`.
    ///
    /// The server drives progress from here on, so the local simulation stops.
    pub fn link_server_job(&self, id: &str, server_job_id: &str) -> bool {
        let linked = {
            let mut jobs = self.inner.jobs.lock();
            match jobs.iter_mut().find(|job| job.id == id) {
                Some(job) => {
                    job.server_job_id = Some(server_job_id.to_string());
                    self.inner.persist(&jobs);
                    true
                }
                None => false,
            }
        };

        if linked {
            tracing::info!("Training job {} linked to server job {}", id, server_job_id);
            self.stop_simulation(id);
        }
        linked
    }

    pub fn find_by_server_id(&self, server_job_id: &str) -> Option<TrainingJob> {
        self.inner
            .jobs
            .lock()
            .iter()
            .find(|job| job.server_job_id.as_deref() == Some(server_job_id))
            .cloned()
    }

    /// Delete `id` and cancel any timer it owns.
    pub fn remove_job(&self, id: &str) -> Option<TrainingJob> {
        self.stop_simulation(id);

        let mut jobs = self.inner.jobs.lock();
        let index = jobs.iter().position(|job| job.id == id)?;
        let removed = jobs.remove(index);
        self.inner.persist(&jobs);
        tracing::info!("Removed training job {}", id);
        Some(removed)
    }

    pub fn is_simulating(&self, id: &str) -> bool {
        self.inner
            .tickers
            .lock()
            .get(id)
            .map_or(false, ScheduledTask::is_active)
    }

    fn start_simulation(&self, id: &str, config: SimulationConfig) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("No async runtime; training job {} will not be simulated", id);
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let job_id = id.to_string();
        let task = ScheduledTask::start(move |cancel| simulate(weak, job_id, config, cancel));
        self.inner.tickers.lock().insert(id.to_string(), task);
    }

    fn stop_simulation(&self, id: &str) {
        let removed = self.inner.tickers.lock().remove(id);
        if let Some(task) = removed {
            task.stop();
        }
    }
}

impl RegistryInner {
    fn persist(&self, jobs: &[TrainingJob]) {
        if let Err(e) = self.store.save(jobs) {
            tracing::error!("Failed to persist training jobs: {}", e);
        }
    }
}

async fn simulate(
    registry: Weak<RegistryInner>,
    id: String,
    config: SimulationConfig,
    cancel: CancellationToken,
) {
    let period = config.period();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(inner) = registry.upgrade() else {
            return;
        };
        let registry = TrainingJobRegistry { inner };

        // Step from the stored value so updates made meanwhile are never rolled back.
        let step = config.next_step();
        let mut finished = false;
        let advanced = registry.apply_update(&id, |current| {
            let progress = current + step;
            if progress >= MAX_UNFINISHED_PROGRESS {
                finished = true;
                (100.0, TrainingStatus::Completed)
            } else {
                (progress, TrainingStatus::Training)
            }
        });

        if !advanced {
            registry.stop_simulation(&id);
            return;
        }
        if finished {
            return;
        }
    }
}

fn normalize_progress(progress: f32, current: f32, status: TrainingStatus) -> f32 {
    if status == TrainingStatus::Completed {
        return 100.0;
    }
    let progress = if progress.is_finite() {
        progress
    } else {
        current
    };
    progress.clamp(0.0, MAX_UNFINISHED_PROGRESS)
}

//! Status polling for server-side jobs.
//!
//! A job is submitted once and then polled on a fixed interval until the server reports a
//! terminal state or the overall timeout elapses. A failed poll (network, HTTP, parse) is logged
//! and the poller keeps going; only a server-reported failure or the timeout ends it early.

use crate::api::{JobStatus, StatusSource};
use crate::task::ScheduledTask;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub mod progress;

pub use progress::{phase_label, PollProgress};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(300_000);
/// Shortest interval the poller will run at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

const SERVER_FAILURE_MESSAGE: &str = "Job failed on the server";
const MISSING_RESULT_MESSAGE: &str = "Job completed without a result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PollOutcome {
    /// `result_url` is always present for pollers that require a result.
    Completed { result_url: Option<String> },
    Failed { message: String },
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PollStats {
    pub fetches: u32,
    pub transient_errors: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollReport {
    pub job_id: String,
    pub outcome: PollOutcome,
    pub stats: PollStats,
}

pub struct JobPoller {
    config: PollerConfig,
    require_result: bool,
}

impl JobPoller {
    pub fn new(config: PollerConfig) -> Self {
        let config = PollerConfig {
            interval: config.interval.max(MIN_POLL_INTERVAL),
            ..config
        };
        Self {
            config,
            require_result: true,
        }
    }

    /// Accept a completed status without a result URL (training jobs produce a model, not audio).
    pub fn without_result(mut self) -> Self {
        self.require_result = false;
        self
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Poll `job_id` until a terminal state, the timeout, or `cancel` fires.
    ///
    /// Every non-terminal observation is published on `progress`. Observed progress never goes
    /// backwards, and nothing is published after the first terminal state.
    pub async fn run(
        &self,
        job_id: &str,
        source: &dyn StatusSource,
        progress: &watch::Sender<PollProgress>,
        cancel: &CancellationToken,
    ) -> PollReport {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut ticker = time::interval_at(started + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats = PollStats::default();
        let mut last_progress = 0.0f32;

        tracing::info!(
            "Polling job {} every {}ms (timeout {}ms)",
            job_id,
            self.config.interval.as_millis(),
            self.config.timeout.as_millis()
        );

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break PollOutcome::Cancelled,
                _ = time::sleep_until(deadline) => break PollOutcome::TimedOut,
                _ = ticker.tick() => {}
            }

            stats.fetches += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PollOutcome::Cancelled,
                _ = time::sleep_until(deadline) => break PollOutcome::TimedOut,
                result = source.fetch_status(job_id) => result,
            };

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    stats.transient_errors += 1;
                    tracing::warn!(
                        "Status check {} for job {} failed: {}; will retry",
                        stats.fetches,
                        job_id,
                        e
                    );
                    continue;
                }
            };

            let observed = clamp_progress(response.progress).max(last_progress);

            match response.status {
                JobStatus::Completed => {
                    let result_url = response.audio_url.filter(|url| !url.trim().is_empty());
                    if result_url.is_none() && self.require_result {
                        progress.send_replace(PollProgress::new(
                            job_id,
                            JobStatus::Failed,
                            observed,
                        ));
                        break PollOutcome::Failed {
                            message: MISSING_RESULT_MESSAGE.to_string(),
                        };
                    }
                    progress.send_replace(PollProgress::new(job_id, JobStatus::Completed, 100.0));
                    break PollOutcome::Completed { result_url };
                }
                JobStatus::Failed => {
                    progress.send_replace(PollProgress::new(job_id, JobStatus::Failed, observed));
                    break PollOutcome::Failed {
                        message: SERVER_FAILURE_MESSAGE.to_string(),
                    };
                }
                status => {
                    last_progress = observed;
                    progress.send_replace(PollProgress::new(job_id, status, observed));
                    tracing::debug!("Job {} {:?} at {:.0}%", job_id, status, observed);
                }
            }
        };

        stats.elapsed = started.elapsed();

        match outcome {
            PollOutcome::Completed { .. } => tracing::info!(
                "Job {} completed after {} polls ({}ms)",
                job_id,
                stats.fetches,
                stats.elapsed.as_millis()
            ),
            PollOutcome::Failed { ref message } => {
                tracing::warn!("Job {} failed: {}", job_id, message)
            }
            PollOutcome::TimedOut => tracing::warn!(
                "Job {} timed out after {}ms ({} polls, {} errors)",
                job_id,
                stats.elapsed.as_millis(),
                stats.fetches,
                stats.transient_errors
            ),
            PollOutcome::Cancelled => tracing::info!("Polling for job {} cancelled", job_id),
        }

        PollReport {
            job_id: job_id.to_string(),
            outcome,
            stats,
        }
    }

    /// Run the poll loop in a background task owned by the returned handle.
    pub fn spawn(&self, job_id: impl Into<String>, source: Arc<dyn StatusSource>) -> PollHandle {
        let job_id = job_id.into();
        let (progress_tx, progress_rx) = watch::channel(PollProgress::initial(job_id.clone()));
        let (report_tx, report_rx) = oneshot::channel();
        let poller = JobPoller {
            config: self.config,
            require_result: self.require_result,
        };
        let task_job_id = job_id.clone();

        let task = ScheduledTask::start(move |cancel| async move {
            let report = poller
                .run(&task_job_id, source.as_ref(), &progress_tx, &cancel)
                .await;
            let _ = report_tx.send(report);
        });

        PollHandle {
            job_id,
            progress: progress_rx,
            report: report_rx,
            task,
        }
    }
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}

/// A running poll. Dropping the handle cancels the poll.
pub struct PollHandle {
    job_id: String,
    progress: watch::Receiver<PollProgress>,
    report: oneshot::Receiver<PollReport>,
    task: ScheduledTask,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn progress(&self) -> watch::Receiver<PollProgress> {
        self.progress.clone()
    }

    pub fn latest(&self) -> PollProgress {
        self.progress.borrow().clone()
    }

    pub fn cancel(&self) {
        self.task.stop();
    }

    pub fn is_active(&self) -> bool {
        self.task.is_active()
    }

    pub async fn wait(self) -> PollReport {
        let PollHandle {
            job_id,
            report,
            task,
            ..
        } = self;

        let report = match report.await {
            Ok(report) => report,
            Err(_) => PollReport {
                job_id,
                outcome: PollOutcome::Cancelled,
                stats: PollStats::default(),
            },
        };
        drop(task);
        report
    }
}

fn clamp_progress(progress: f32) -> f32 {
    if progress.is_finite() {
        progress.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

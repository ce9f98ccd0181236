use super::{finish, upload_reference};
use crate::api::{
    ApiError, ApiStatusSource, JobKind, JobResponse, JobStatus, StatusSource, TrainingRequest,
    VoiceBackend,
};
use crate::audio::AudioFile;
use crate::error::JobError;
use crate::poller::{JobPoller, PollOutcome, PollProgress, PollReport, PollerConfig};
use crate::registry::{TrainingJob, TrainingJobRegistry, TrainingStatus};
use crate::task::ScheduledTask;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

/// State of the training page. Jobs started here live in the shared registry; the session only
/// owns the polls that keep them up to date.
pub struct TrainingSession {
    backend: Arc<dyn VoiceBackend>,
    registry: TrainingJobRegistry,
    poller: PollerConfig,
    config_path: Option<PathBuf>,
    reference: Option<AudioFile>,
    tracked: HashMap<String, TrackedJob>,
}

struct TrackedJob {
    task: ScheduledTask,
    report: oneshot::Receiver<PollReport>,
}

impl TrainingSession {
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        registry: TrainingJobRegistry,
        poller: PollerConfig,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            backend,
            registry,
            poller,
            config_path,
            reference: None,
            tracked: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &TrainingJobRegistry {
        &self.registry
    }

    pub fn reference(&self) -> Option<&AudioFile> {
        self.reference.as_ref()
    }

    pub async fn upload_reference(&mut self, path: impl AsRef<Path>) -> Result<&AudioFile, JobError> {
        let audio =
            upload_reference(self.backend.as_ref(), self.config_path.as_deref(), path.as_ref())
                .await?;
        Ok(self.reference.insert(audio))
    }

    /// Create a local job for `model_name`, submit it, and keep it updated from the server.
    ///
    /// Returns the local job id. The job shows up in the registry before the server answers; if
    /// submission fails it is marked failed.
    pub async fn start_training(&mut self, model_name: &str) -> Result<String, JobError> {
        let name = model_name.trim();
        if name.is_empty() {
            return Err(JobError::MissingInput("model name"));
        }
        let reference_uuid = self
            .reference
            .as_ref()
            .and_then(|audio| audio.server_id.clone())
            .ok_or(JobError::MissingInput("reference audio"))?;

        let local_id = self.registry.create_job(name);
        let request = TrainingRequest {
            reference_uuid,
            model_name: name.to_string(),
        };

        let response = match self.backend.start_training(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Training submission for {} failed: {}", local_id, e);
                self.mark_failed(&local_id);
                return Err(JobError::Submission(e));
            }
        };

        self.registry.link_server_job(&local_id, &response.uuid);

        match response.status {
            JobStatus::Completed => {
                self.registry
                    .update_job(&local_id, 100.0, TrainingStatus::Completed);
            }
            JobStatus::Failed => {
                self.mark_failed(&local_id);
                return Err(JobError::ServerFailed {
                    job_id: response.uuid,
                    message: "Training failed on the server".to_string(),
                });
            }
            status => {
                self.registry
                    .update_job(&local_id, response.progress, status.into());
                self.track(&local_id, response.uuid);
            }
        }

        Ok(local_id)
    }

    /// Wait for a tracked job to finish and return its final record.
    pub async fn wait_for(&mut self, local_id: &str) -> Result<TrainingJob, JobError> {
        if let Some(TrackedJob { task, report }) = self.tracked.remove(local_id) {
            let report = report
                .await
                .map_err(|_| JobError::Cancelled(local_id.to_string()))?;
            drop(task);
            finish(report)?;
        }

        self.registry
            .get_job(local_id)
            .ok_or_else(|| JobError::UnknownJob(local_id.to_string()))
    }

    pub fn is_tracking(&self, local_id: &str) -> bool {
        self.tracked
            .get(local_id)
            .map_or(false, |tracked| tracked.task.is_active())
    }

    /// Ask the server to cancel `local_id`. Returns whether the server accepted.
    ///
    /// Jobs never confirmed by the server are failed locally. Finished jobs are left alone and
    /// return false.
    pub async fn cancel_training(&mut self, local_id: &str) -> Result<bool, JobError> {
        let job = self
            .registry
            .get_job(local_id)
            .ok_or_else(|| JobError::UnknownJob(local_id.to_string()))?;

        if job.status.is_terminal() {
            tracing::info!(
                "Training job {} already {:?}; nothing to cancel",
                local_id,
                job.status
            );
            self.tracked.remove(local_id);
            return Ok(false);
        }

        let accepted = match job.server_job_id {
            Some(ref server_id) => self
                .backend
                .cancel_training(server_id)
                .await
                .map_err(JobError::CancelFailed)?,
            None => true,
        };

        if accepted {
            if let Some(tracked) = self.tracked.remove(local_id) {
                tracked.task.stop();
            }
            self.registry
                .update_job(local_id, job.progress, TrainingStatus::Failed);
            tracing::info!("Training job {} cancelled", local_id);
        } else {
            tracing::warn!("Server refused to cancel training job {}", local_id);
        }
        Ok(accepted)
    }

    /// Stop polling `local_id` and delete it from the registry.
    pub fn remove_job(&mut self, local_id: &str) -> Option<TrainingJob> {
        if let Some(tracked) = self.tracked.remove(local_id) {
            tracked.task.stop();
        }
        self.registry.remove_job(local_id)
    }

    /// Forget the reference and stop every poll this session owns.
    pub fn clear(&mut self) {
        self.reference = None;
        if !self.tracked.is_empty() {
            tracing::info!("Stopping {} training polls", self.tracked.len());
        }
        self.tracked.clear();
    }

    fn track(&mut self, local_id: &str, server_id: String) {
        let source = ApiStatusSource::new(self.backend.clone(), JobKind::Training);
        let registry = self.registry.clone();
        let bridge_id = local_id.to_string();
        let poller = JobPoller::new(self.poller).without_result();
        let (report_tx, report_rx) = oneshot::channel();

        let task = ScheduledTask::start(move |cancel| async move {
            let bridge = RegistryBridge {
                source,
                registry,
                local_id: bridge_id,
                cancel: cancel.clone(),
            };
            let (progress, _) = watch::channel(PollProgress::initial(server_id.clone()));
            let report = poller.run(&server_id, &bridge, &progress, &cancel).await;
            bridge.record(&report);
            let _ = report_tx.send(report);
        });

        self.tracked.insert(
            local_id.to_string(),
            TrackedJob {
                task,
                report: report_rx,
            },
        );
    }

    fn mark_failed(&self, local_id: &str) {
        let progress = self
            .registry
            .get_job(local_id)
            .map_or(0.0, |job| job.progress);
        self.registry
            .update_job(local_id, progress, TrainingStatus::Failed);
    }
}

/// Status source that copies every in-flight observation into the registry.
///
/// Once the local record is gone or already finished, it cancels its own poll instead of
/// calling the server.
struct RegistryBridge {
    source: ApiStatusSource,
    registry: TrainingJobRegistry,
    local_id: String,
    cancel: CancellationToken,
}

impl RegistryBridge {
    fn current_progress(&self) -> f32 {
        self.registry
            .get_job(&self.local_id)
            .map_or(0.0, |job| job.progress)
    }

    fn record(&self, report: &PollReport) {
        match report.outcome {
            PollOutcome::Completed { .. } => {
                self.registry
                    .update_job(&self.local_id, 100.0, TrainingStatus::Completed);
            }
            PollOutcome::Failed { .. } | PollOutcome::TimedOut => {
                self.registry.update_job(
                    &self.local_id,
                    self.current_progress(),
                    TrainingStatus::Failed,
                );
            }
            PollOutcome::Cancelled => {}
        }
    }
}

#[async_trait]
impl StatusSource for RegistryBridge {
    async fn fetch_status(&self, job_id: &str) -> Result<JobResponse, ApiError> {
        let still_open = self
            .registry
            .get_job(&self.local_id)
            .map_or(false, |job| !job.status.is_terminal());
        if !still_open {
            tracing::info!(
                "Training job {} is gone or finished locally; stopping poll of {}",
                self.local_id,
                job_id
            );
            self.cancel.cancel();
            return Err(ApiError::InvalidResponse(format!(
                "training job {} no longer tracked",
                self.local_id
            )));
        }

        let response = self.source.fetch_status(job_id).await?;
        if !response.status.is_terminal() {
            let progress = response.progress.max(self.current_progress());
            self.registry
                .update_job(&self.local_id, progress, response.status.into());
        }
        Ok(response)
    }
}

//! Page-level flows: upload reference audio, then generate speech or start a training job.

use crate::api::VoiceBackend;
use crate::audio::AudioFile;
use crate::config;
use crate::error::JobError;
use crate::poller::{PollOutcome, PollReport, PollStats};
use std::path::Path;

pub mod generation;
pub mod training;

pub use generation::{GenerationResult, GenerationSession};
pub use training::TrainingSession;

/// Read `path`, upload it, and remember the upload in the config file at `config_path`.
///
/// Writing the note is best effort; the upload succeeds even if the config file cannot be saved.
async fn upload_reference(
    backend: &dyn VoiceBackend,
    config_path: Option<&Path>,
    path: &Path,
) -> Result<AudioFile, JobError> {
    let audio = AudioFile::from_path(path)?;
    let upload = backend
        .upload_audio(&audio)
        .await
        .map_err(JobError::Upload)?;
    let audio = audio.with_server_id(upload.uuid);

    if let (Some(config_path), Some(note)) = (config_path, audio.note()) {
        if let Err(e) = config::record_reference_audio(config_path, note) {
            tracing::warn!("Could not remember reference audio '{}': {}", audio.file_name, e);
        }
    }

    Ok(audio)
}

/// Turn a finished poll into the result URL (if any) or the matching error.
fn finish(report: PollReport) -> Result<(Option<String>, PollStats), JobError> {
    let PollReport {
        job_id,
        outcome,
        stats,
    } = report;

    match outcome {
        PollOutcome::Completed { result_url } => Ok((result_url, stats)),
        PollOutcome::Failed { message } => Err(JobError::ServerFailed { job_id, message }),
        PollOutcome::TimedOut => Err(JobError::TimedOut {
            job_id,
            elapsed: stats.elapsed,
        }),
        PollOutcome::Cancelled => Err(JobError::Cancelled(job_id)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::api::{
        ApiError, GenerateRequest, JobKind, JobResponse, JobStatus, TrainingRequest,
        UploadResponse, VoiceBackend,
    };
    use crate::audio::AudioFile;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// In-process backend. Status responses are replayed in order; the last one repeats.
    pub struct FakeBackend {
        pub statuses: Mutex<VecDeque<JobResponse>>,
        pub submission: Mutex<Option<Result<JobResponse, ApiError>>>,
        pub generate_requests: Mutex<Vec<GenerateRequest>>,
        pub training_requests: Mutex<Vec<TrainingRequest>>,
        pub status_calls: Mutex<Vec<(JobKind, String)>>,
        pub cancelled: Mutex<Vec<String>>,
        pub reject_uploads: bool,
    }

    impl FakeBackend {
        pub fn new(submission: JobResponse, statuses: Vec<JobResponse>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                submission: Mutex::new(Some(Ok(submission))),
                generate_requests: Mutex::new(Vec::new()),
                training_requests: Mutex::new(Vec::new()),
                status_calls: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
                reject_uploads: false,
            }
        }

        pub fn failing_submission(error: ApiError) -> Self {
            let backend = Self::new(job("unused", JobStatus::Queued, 0.0, None), vec![]);
            *backend.submission.lock() = Some(Err(error));
            backend
        }

        pub fn status_calls(&self) -> usize {
            self.status_calls.lock().len()
        }

        fn submit(&self) -> Result<JobResponse, ApiError> {
            self.submission
                .lock()
                .clone()
                .unwrap_or_else(|| Err(ApiError::NetworkError("no submission scripted".into())))
        }
    }

    #[async_trait]
    impl VoiceBackend for FakeBackend {
        async fn upload_audio(&self, audio: &AudioFile) -> Result<UploadResponse, ApiError> {
            if self.reject_uploads {
                return Err(ApiError::UploadRejected);
            }
            Ok(UploadResponse {
                uuid: format!("upload-{}", audio.file_name),
                success: true,
            })
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<JobResponse, ApiError> {
            self.generate_requests.lock().push(request.clone());
            self.submit()
        }

        async fn start_training(
            &self,
            request: &TrainingRequest,
        ) -> Result<JobResponse, ApiError> {
            self.training_requests.lock().push(request.clone());
            self.submit()
        }

        async fn job_status(&self, kind: JobKind, uuid: &str) -> Result<JobResponse, ApiError> {
            self.status_calls.lock().push((kind, uuid.to_string()));
            let mut statuses = self.statuses.lock();
            let next = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            next.ok_or_else(|| ApiError::NetworkError("no status scripted".into()))
        }

        async fn cancel_training(&self, uuid: &str) -> Result<bool, ApiError> {
            self.cancelled.lock().push(uuid.to_string());
            Ok(true)
        }

        async fn health(&self) -> bool {
            true
        }
    }

    pub fn job(uuid: &str, status: JobStatus, progress: f32, audio_url: Option<&str>) -> JobResponse {
        JobResponse {
            uuid: uuid.to_string(),
            status,
            progress,
            audio_url: audio_url.map(str::to_string),
        }
    }

    /// Write a small wav file into `dir` and return its path.
    pub fn wav_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"RIFF\0\0\0\0WAVEfmt ").unwrap();
        path
    }
}

use super::{finish, upload_reference};
use crate::api::{ApiStatusSource, GenerateRequest, JobKind, JobStatus, VoiceBackend};
use crate::audio::AudioFile;
use crate::error::JobError;
use crate::poller::{JobPoller, PollHandle, PollProgress, PollStats, PollerConfig};
use crate::voice::VoiceSettings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Generated audio for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub job_id: String,
    pub audio_url: String,
    pub stats: PollStats,
}

/// State of the accent generator: one reference, one prompt, at most one job in flight.
pub struct GenerationSession {
    backend: Arc<dyn VoiceBackend>,
    poller: JobPoller,
    config_path: Option<PathBuf>,
    reference: Option<AudioFile>,
    prompt: String,
    output: Option<GenerationResult>,
    active: Option<PollHandle>,
}

impl GenerationSession {
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        poller: PollerConfig,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            backend,
            poller: JobPoller::new(poller),
            config_path,
            reference: None,
            prompt: String::new(),
            output: None,
            active: None,
        }
    }

    pub fn reference(&self) -> Option<&AudioFile> {
        self.reference.as_ref()
    }

    pub async fn upload_reference(&mut self, path: impl AsRef<Path>) -> Result<&AudioFile, JobError> {
        let audio =
            upload_reference(self.backend.as_ref(), self.config_path.as_deref(), path.as_ref())
                .await?;
        self.output = None;
        Ok(self.reference.insert(audio))
    }

    pub fn remove_reference(&mut self) {
        self.reference = None;
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn output(&self) -> Option<&GenerationResult> {
        self.output.as_ref()
    }

    /// Progress of the job in flight, if any.
    pub fn progress(&self) -> Option<watch::Receiver<PollProgress>> {
        self.active.as_ref().map(PollHandle::progress)
    }

    pub fn is_processing(&self) -> bool {
        self.active.as_ref().map_or(false, PollHandle::is_active)
    }

    /// Submit a generation job and start polling it. Returns the server job id.
    pub async fn submit(&mut self, settings: &VoiceSettings) -> Result<String, JobError> {
        if self.is_processing() {
            return Err(JobError::Busy);
        }
        settings.validate()?;

        let reference_uuid = self
            .reference
            .as_ref()
            .and_then(|audio| audio.server_id.clone())
            .ok_or(JobError::MissingInput("reference audio"))?;
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(JobError::MissingInput("prompt"));
        }

        let request = GenerateRequest {
            reference_uuid,
            target_uuid: None,
            prompt: prompt.to_string(),
            accent: settings.accent,
            gender: settings.gender,
            speed: settings.speed,
            pitch: settings.pitch,
        };

        self.output = None;
        let job = self
            .backend
            .generate(&request)
            .await
            .map_err(JobError::Submission)?;

        match job.status {
            JobStatus::Completed => match job.audio_url.filter(|url| !url.trim().is_empty()) {
                Some(audio_url) => {
                    tracing::info!("Generation {} finished on submission", job.uuid);
                    self.output = Some(GenerationResult {
                        job_id: job.uuid.clone(),
                        audio_url,
                        stats: PollStats::default(),
                    });
                }
                None => {
                    return Err(JobError::ServerFailed {
                        job_id: job.uuid,
                        message: "Job completed without a result".to_string(),
                    })
                }
            },
            JobStatus::Failed => {
                return Err(JobError::ServerFailed {
                    job_id: job.uuid,
                    message: "Job failed on the server".to_string(),
                })
            }
            _ => {
                let source = Arc::new(ApiStatusSource::new(
                    self.backend.clone(),
                    JobKind::Generation,
                ));
                self.active = Some(self.poller.spawn(job.uuid.clone(), source));
            }
        }

        Ok(job.uuid)
    }

    /// Wait for the submitted job. Dropping the returned future cancels the poll.
    pub async fn wait_for_result(&mut self) -> Result<GenerationResult, JobError> {
        let Some(handle) = self.active.take() else {
            return self
                .output
                .clone()
                .ok_or(JobError::MissingInput("submitted job"));
        };

        let job_id = handle.job_id().to_string();
        let (audio_url, stats) = finish(handle.wait().await)?;
        let audio_url = audio_url.ok_or_else(|| JobError::ServerFailed {
            job_id: job_id.clone(),
            message: "Job completed without a result".to_string(),
        })?;

        let result = GenerationResult {
            job_id,
            audio_url,
            stats,
        };
        self.output = Some(result.clone());
        Ok(result)
    }

    pub async fn generate(&mut self, settings: &VoiceSettings) -> Result<GenerationResult, JobError> {
        self.submit(settings).await?;
        self.wait_for_result().await
    }

    /// Stop polling the job in flight. The server job itself keeps running.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            tracing::info!("Cancelling generation {}", handle.job_id());
            handle.cancel();
        }
    }

    pub fn clear(&mut self) {
        self.cancel();
        self.reference = None;
        self.prompt.clear();
        self.output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::config;
    use crate::session::testing::{job, wav_file, FakeBackend};
    use crate::voice::Accent;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(backend: Arc<FakeBackend>) -> GenerationSession {
        GenerationSession::new(backend, PollerConfig::default(), None)
    }

    fn processing(progress: f32) -> crate::api::JobResponse {
        job("g-1", JobStatus::Processing, progress, None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_polls_until_complete() {
        let backend = Arc::new(FakeBackend::new(
            job("g-1", JobStatus::Queued, 0.0, None),
            vec![
                processing(30.0),
                processing(70.0),
                job("g-1", JobStatus::Completed, 100.0, Some("https://cdn/g-1.wav")),
            ],
        ));
        let dir = TempDir::new().unwrap();
        let mut session = session(backend.clone());

        let audio = session
            .upload_reference(wav_file(&dir, "voice.wav"))
            .await
            .unwrap();
        assert_eq!(audio.server_id.as_deref(), Some("upload-voice.wav"));

        session.set_prompt("  Hello there  ");
        let settings = VoiceSettings::new(Accent::British);
        let result = session.generate(&settings).await.unwrap();

        assert_eq!(result.job_id, "g-1");
        assert_eq!(result.audio_url, "https://cdn/g-1.wav");
        assert_eq!(result.stats.fetches, 3);
        assert_eq!(session.output(), Some(&result));
        assert!(!session.is_processing());

        let request = backend.generate_requests.lock()[0].clone();
        assert_eq!(request.reference_uuid, "upload-voice.wav");
        assert_eq!(request.prompt, "Hello there");
        assert_eq!(request.accent, Accent::British);
        assert!(backend
            .status_calls
            .lock()
            .iter()
            .all(|(kind, id)| *kind == JobKind::Generation && id == "g-1"));
    }

    #[tokio::test]
    async fn test_requires_reference_and_prompt() {
        let backend = Arc::new(FakeBackend::new(processing(0.0), vec![]));
        let dir = TempDir::new().unwrap();
        let mut session = session(backend.clone());
        let settings = VoiceSettings::new(Accent::American);

        session.set_prompt("Hi");
        assert!(matches!(
            session.submit(&settings).await,
            Err(JobError::MissingInput("reference audio"))
        ));

        session
            .upload_reference(wav_file(&dir, "voice.wav"))
            .await
            .unwrap();
        session.set_prompt("   ");
        assert!(matches!(
            session.submit(&settings).await,
            Err(JobError::MissingInput("prompt"))
        ));
        assert!(backend.generate_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected_before_submission() {
        let backend = Arc::new(FakeBackend::new(processing(0.0), vec![]));
        let mut session = session(backend.clone());
        let mut settings = VoiceSettings::new(Accent::Irish);
        settings.speed = 3.0;

        let err = session.submit(&settings).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidSettings(_)));
        assert!(backend.generate_requests.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failure_is_reported() {
        let backend = Arc::new(FakeBackend::new(
            processing(0.0),
            vec![processing(20.0), job("g-1", JobStatus::Failed, 20.0, None)],
        ));
        let dir = TempDir::new().unwrap();
        let mut session = session(backend);
        session
            .upload_reference(wav_file(&dir, "voice.mp3"))
            .await
            .unwrap();
        session.set_prompt("Hello");

        let err = session
            .generate(&VoiceSettings::new(Accent::Canadian))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ServerFailed { ref job_id, .. } if job_id == "g-1"));
        assert!(session.output().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_distinct_error() {
        let backend = Arc::new(FakeBackend::new(processing(0.0), vec![processing(50.0)]));
        let dir = TempDir::new().unwrap();
        let mut session = session(backend);
        session
            .upload_reference(wav_file(&dir, "voice.wav"))
            .await
            .unwrap();
        session.set_prompt("Hello");

        let err = session
            .generate(&VoiceSettings::new(Accent::Australian))
            .await
            .unwrap_err();
        match err {
            JobError::TimedOut { elapsed, .. } => {
                assert_eq!(elapsed, Duration::from_millis(300_000))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_polling() {
        let backend = Arc::new(FakeBackend::new(processing(0.0), vec![processing(10.0)]));
        let dir = TempDir::new().unwrap();
        let mut session = session(backend.clone());
        session
            .upload_reference(wav_file(&dir, "voice.wav"))
            .await
            .unwrap();
        session.set_prompt("Hello");

        session
            .submit(&VoiceSettings::new(Accent::American))
            .await
            .unwrap();
        assert!(session.is_processing());
        assert!(matches!(
            session.submit(&VoiceSettings::new(Accent::American)).await,
            Err(JobError::Busy)
        ));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        let calls = backend.status_calls();
        assert_eq!(calls, 2);

        session.clear();
        assert!(!session.is_processing());
        assert!(session.reference().is_none());
        assert!(session.prompt().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_calls(), calls);
    }

    #[tokio::test]
    async fn test_submission_failure() {
        let backend = Arc::new(FakeBackend::failing_submission(ApiError::RateLimitError));
        let dir = TempDir::new().unwrap();
        let mut session = session(backend);
        session
            .upload_reference(wav_file(&dir, "voice.wav"))
            .await
            .unwrap();
        session.set_prompt("Hello");

        let err = session
            .submit(&VoiceSettings::new(Accent::American))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Submission(ApiError::RateLimitError)));
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn test_upload_records_reference_note() {
        let backend = Arc::new(FakeBackend::new(processing(0.0), vec![]));
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        let mut session = GenerationSession::new(
            backend,
            PollerConfig::default(),
            Some(config_path.clone()),
        );

        session
            .upload_reference(wav_file(&dir, "sample.flac"))
            .await
            .unwrap();

        let saved = config::load_or_create(&config_path).unwrap();
        let note = saved.last_reference_audio.unwrap();
        assert_eq!(note.file_name, "sample.flac");
        assert_eq!(note.server_id, "upload-sample.flac");
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_no_reference() {
        let mut backend = FakeBackend::new(processing(0.0), vec![]);
        backend.reject_uploads = true;
        let dir = TempDir::new().unwrap();
        let mut session = session(Arc::new(backend));

        let err = session
            .upload_reference(wav_file(&dir, "voice.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Upload(ApiError::UploadRejected)));
        assert!(session.reference().is_none());
    }
}

// src/api/mod.rs
// Backend API - uploads, generation and training jobs

mod client;
mod types;

pub use client::VoiceApiClient;
pub use types::{
    ApiError, GenerateRequest, JobKind, JobResponse, JobStatus, TrainingRequest, UploadResponse,
};

use crate::audio::AudioFile;
use async_trait::async_trait;
use std::sync::Arc;

/// The remote voice service as the rest of the crate sees it
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Upload reference audio and return the server's upload id
    async fn upload_audio(&self, audio: &AudioFile) -> Result<UploadResponse, ApiError>;

    async fn generate(&self, request: &GenerateRequest) -> Result<JobResponse, ApiError>;

    async fn start_training(&self, request: &TrainingRequest) -> Result<JobResponse, ApiError>;

    async fn job_status(&self, kind: JobKind, uuid: &str) -> Result<JobResponse, ApiError>;

    async fn cancel_training(&self, uuid: &str) -> Result<bool, ApiError>;

    async fn health(&self) -> bool;
}

#[async_trait]
impl VoiceBackend for VoiceApiClient {
    async fn upload_audio(&self, audio: &AudioFile) -> Result<UploadResponse, ApiError> {
        VoiceApiClient::upload_audio(self, audio).await
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<JobResponse, ApiError> {
        VoiceApiClient::generate(self, request).await
    }

    async fn start_training(&self, request: &TrainingRequest) -> Result<JobResponse, ApiError> {
        VoiceApiClient::start_training(self, request).await
    }

    async fn job_status(&self, kind: JobKind, uuid: &str) -> Result<JobResponse, ApiError> {
        VoiceApiClient::job_status(self, kind, uuid).await
    }

    async fn cancel_training(&self, uuid: &str) -> Result<bool, ApiError> {
        VoiceApiClient::cancel_training(self, uuid).await
    }

    async fn health(&self) -> bool {
        VoiceApiClient::health(self).await
    }
}

/// Anything the poller can ask for the current state of a job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<JobResponse, ApiError>;
}

/// Status source backed by the generation or training status endpoint.
pub struct ApiStatusSource {
    backend: Arc<dyn VoiceBackend>,
    kind: JobKind,
}

impl ApiStatusSource {
    pub fn new(backend: Arc<dyn VoiceBackend>, kind: JobKind) -> Self {
        Self { backend, kind }
    }
}

#[async_trait]
impl StatusSource for ApiStatusSource {
    async fn fetch_status(&self, job_id: &str) -> Result<JobResponse, ApiError> {
        self.backend.job_status(self.kind, job_id).await
    }
}

// src/api/client.rs
// HTTP client for the voice generation/training backend

use super::types::CancelResponse;
use super::{ApiError, GenerateRequest, JobKind, JobResponse, TrainingRequest, UploadResponse};
use crate::audio::AudioFile;
use reqwest::{multipart, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const TIMEOUT_SECS: u64 = 30;
const UPLOAD_TIMEOUT_SECS: u64 = 60;
const HEALTH_TIMEOUT_SECS: u64 = 8;

pub struct VoiceApiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl VoiceApiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        tracing::info!(
            "Voice API client initialized: base_url={}, authenticated={}",
            base_url,
            api_key.is_some()
        );

        Self {
            base_url,
            api_key,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Upload reference audio; returns the server-assigned upload id.
    pub async fn upload_audio(&self, audio: &AudioFile) -> Result<UploadResponse, ApiError> {
        tracing::info!(
            "Uploading reference audio '{}' ({} bytes)",
            audio.file_name,
            audio.len()
        );

        let file_part = multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(audio.mime_type)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let form = multipart::Form::new().part("audio", file_part);

        let request = self
            .authorize(self.client.post(self.url("upload")))
            .multipart(form)
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS));

        let upload: UploadResponse = Self::send_json(request).await?;
        if !upload.success || upload.uuid.trim().is_empty() {
            tracing::warn!("Upload of '{}' rejected by server", audio.file_name);
            return Err(ApiError::UploadRejected);
        }

        tracing::info!("Upload accepted: uuid={}", upload.uuid);
        Ok(upload)
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<JobResponse, ApiError> {
        tracing::info!(
            "Submitting generation: reference={}, accent={:?}, prompt_len={}",
            request.reference_uuid,
            request.accent,
            request.prompt.len()
        );

        let builder = self
            .authorize(self.client.post(self.url("generate")))
            .json(request);
        Self::send_json(builder).await
    }

    pub async fn start_training(&self, request: &TrainingRequest) -> Result<JobResponse, ApiError> {
        tracing::info!(
            "Submitting training: reference={}, model='{}'",
            request.reference_uuid,
            request.model_name
        );

        let builder = self
            .authorize(self.client.post(self.url("training")))
            .json(request);
        Self::send_json(builder).await
    }

    /// `GET /generate/{uuid}` or `GET /training/{uuid}`
    pub async fn job_status(&self, kind: JobKind, uuid: &str) -> Result<JobResponse, ApiError> {
        let path = format!("{}/{}", kind.path(), uuid);
        let builder = self.authorize(self.client.get(self.url(&path)));
        Self::send_json(builder).await
    }

    pub async fn cancel_training(&self, uuid: &str) -> Result<bool, ApiError> {
        let path = format!("training/{}/cancel", uuid);
        let builder = self.authorize(self.client.post(self.url(&path)));
        let response: CancelResponse = Self::send_json(builder).await?;
        Ok(response.success)
    }

    /// Returns false on any failure instead of an error.
    pub async fn health(&self) -> bool {
        let builder = self
            .authorize(self.client.get(self.url("health")))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS));

        match builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::error!("API connection test failed: {}", e);
                false
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(map_send_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();

    if status.is_success() {
        Ok(resp)
    } else if status.as_u16() == 401 {
        Err(ApiError::AuthenticationError)
    } else if status.as_u16() == 429 {
        Err(ApiError::RateLimitError)
    } else {
        let status_text = status.canonical_reason().unwrap_or("Unknown status");
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!("HTTP {} {}: {}", status.as_u16(), status_text, body);
        Err(ApiError::HttpError {
            status: status.as_u16(),
            status_text: status_text.to_string(),
        })
    }
}

fn map_send_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::TimeoutError
    } else {
        ApiError::NetworkError(e.to_string())
    }
}

// src/api/types.rs
// Backend API types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::voice::{Accent, Gender};

/// Server-side job lifecycle shared by generation and training jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    /// Training endpoints report `training` for the same state.
    #[serde(alias = "training", alias = "running")]
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Which family of endpoints a server job id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Generation,
    Training,
}

impl JobKind {
    pub fn path(self) -> &'static str {
        match self {
            JobKind::Generation => "generate",
            JobKind::Training => "training",
        }
    }
}

/// Response of `POST /upload`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub uuid: String,
    #[serde(default)]
    pub success: bool,
}

/// Response of every job endpoint (submission and status)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub uuid: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// Body of `POST /generate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub reference_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_uuid: Option<String>,
    pub prompt: String,
    pub accent: Accent,
    pub gender: Gender,
    pub speed: f32,
    pub pitch: f32,
}

/// Body of `POST /training`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
    pub reference_uuid: String,
    pub model_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CancelResponse {
    #[serde(default)]
    pub success: bool,
}

/// Backend API errors with retry classification
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    TimeoutError,

    #[error("Authentication failed")]
    AuthenticationError,

    #[error("Rate limit exceeded")]
    RateLimitError,

    #[error("HTTP {status}: {status_text}")]
    HttpError { status: u16, status_text: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Upload rejected by server")]
    UploadRejected,
}

impl ApiError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkError(_) | ApiError::TimeoutError | ApiError::RateLimitError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_status_alias() {
        let job: JobResponse =
            serde_json::from_str(r#"{"uuid":"t-1","status":"training","progress":42}"#).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 42.0);
        assert!(job.audio_url.is_none());
    }

    #[test]
    fn test_completed_job_carries_audio_url() {
        let job: JobResponse = serde_json::from_str(
            r#"{"uuid":"g-1","status":"completed","progress":100,"audioUrl":"https://cdn/x.wav"}"#,
        )
        .unwrap();
        assert!(job.status.is_terminal());
        assert_eq!(job.audio_url.as_deref(), Some("https://cdn/x.wav"));
    }

    #[test]
    fn test_missing_progress_defaults_to_zero() {
        let job: JobResponse = serde_json::from_str(r#"{"uuid":"g-2","status":"queued"}"#).unwrap();
        assert_eq!(job.progress, 0.0);
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn test_generate_request_wire_shape() {
        let req = GenerateRequest {
            reference_uuid: "ref".to_string(),
            target_uuid: None,
            prompt: "hello".to_string(),
            accent: Accent::British,
            gender: Gender::Female,
            speed: 1.0,
            pitch: -2.0,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["referenceUuid"], "ref");
        assert_eq!(value["accent"], "british");
        assert_eq!(value["gender"], "female");
        assert!(value.get("targetUuid").is_none());
    }

    #[test]
    fn test_retry_classification() {
        assert!(ApiError::TimeoutError.is_retryable());
        assert!(!ApiError::AuthenticationError.is_retryable());
        assert!(!ApiError::HttpError {
            status: 500,
            status_text: "Internal Server Error".to_string()
        }
        .is_retryable());
    }
}

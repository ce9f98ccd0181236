use crate::api::ApiError;
use crate::audio::AudioError;
use crate::voice::VoiceSettingsError;
use std::time::Duration;
use thiserror::Error;

/// Failures of the upload / generate / train flows.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Could not read reference audio: {0}")]
    Audio(#[from] AudioError),

    #[error("Upload failed: {0}")]
    Upload(#[source] ApiError),

    #[error("Job submission failed: {0}")]
    Submission(#[source] ApiError),

    #[error("Job {job_id} failed: {message}")]
    ServerFailed { job_id: String, message: String },

    #[error("Job {job_id} took too long ({}s without a result)", .elapsed.as_secs())]
    TimedOut { job_id: String, elapsed: Duration },

    #[error("Job {0} was cancelled")]
    Cancelled(String),

    #[error("Cancelling job failed: {0}")]
    CancelFailed(#[source] ApiError),

    #[error("Missing {0}")]
    MissingInput(&'static str),

    #[error("Invalid voice settings: {0}")]
    InvalidSettings(#[from] VoiceSettingsError),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("A job is already being processed")]
    Busy,
}

/// Short notification shown to the user for a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub title: &'static str,
    pub description: String,
}

impl JobError {
    pub fn user_message(&self) -> UserMessage {
        let (title, description) = match self {
            JobError::Audio(e) => ("Upload failed", e.to_string()),
            JobError::Upload(_) => (
                "Upload failed",
                "There was an error uploading your audio file.".to_string(),
            ),
            JobError::Submission(_) => (
                "Generation failed",
                "The job could not be started. Please try again.".to_string(),
            ),
            JobError::ServerFailed { .. } => (
                "Generation failed",
                "There was an error processing your audio.".to_string(),
            ),
            JobError::TimedOut { .. } => (
                "Generation timed out",
                "The job took too long to finish. Please try again.".to_string(),
            ),
            JobError::Cancelled(_) => ("Cancelled", "The job was cancelled.".to_string()),
            JobError::CancelFailed(_) => (
                "Cancel failed",
                "The job could not be cancelled on the server.".to_string(),
            ),
            JobError::MissingInput(what) => ("Missing input", format!("Please provide a {}.", what)),
            JobError::InvalidSettings(e) => ("Invalid settings", e.to_string()),
            JobError::UnknownJob(id) => ("Unknown job", format!("No job named {}.", id)),
            JobError::Busy => (
                "Still processing",
                "Wait for the current job to finish or clear the session.".to_string(),
            ),
        };
        UserMessage { title, description }
    }
}

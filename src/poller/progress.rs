use crate::api::JobStatus;
use serde::Serialize;

pub const PHASE_ANALYZING: &str = "Analyzing reference audio...";
pub const PHASE_EXTRACTING: &str = "Extracting voice characteristics...";
pub const PHASE_SYNTHESIZING: &str = "Synthesizing speech...";
pub const PHASE_FINALIZING: &str = "Finalizing output...";

/// Human-readable phase for a progress percentage.
pub fn phase_label(progress: f32) -> &'static str {
    if progress < 25.0 {
        PHASE_ANALYZING
    } else if progress < 50.0 {
        PHASE_EXTRACTING
    } else if progress < 75.0 {
        PHASE_SYNTHESIZING
    } else {
        PHASE_FINALIZING
    }
}

/// Latest observed state of a polled job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f32,
    pub phase: &'static str,
}

impl PollProgress {
    pub fn initial(job_id: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Queued, 0.0)
    }

    pub fn new(job_id: impl Into<String>, status: JobStatus, progress: f32) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress,
            phase: phase_label(progress),
        }
    }
}

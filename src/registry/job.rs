use crate::api::JobStatus;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Queued,
    Training,
    Completed,
    Failed,
}

impl TrainingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrainingStatus::Completed | TrainingStatus::Failed)
    }
}

impl From<JobStatus> for TrainingStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => TrainingStatus::Queued,
            JobStatus::Processing => TrainingStatus::Training,
            JobStatus::Completed => TrainingStatus::Completed,
            JobStatus::Failed => TrainingStatus::Failed,
        }
    }
}

/// A training job tracked on this client.
///
/// `id` is generated locally and is unrelated to the server's job uuid; the two are tied
/// together only through `server_job_id`, set by `TrainingJobRegistry::link_server_job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub id: String,
    pub name: String,
    pub status: TrainingStatus,
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_job_id: Option<String>,
}

impl TrainingJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_job_id(),
            name: name.into(),
            status: TrainingStatus::Queued,
            progress: 0.0,
            created_at: Utc::now(),
            completed_at: None,
            server_job_id: None,
        }
    }
}

/// `job-<unix millis>-<random base36 suffix>`
pub fn new_job_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|c| (c as char).to_ascii_lowercase())
        .take(ID_SUFFIX_LEN)
        .collect();
    format!("job-{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_job_id_shape() {
        let id = new_job_id();
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "job");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_job_ids_are_unique() {
        let ids: HashSet<String> = (0..500).map(|_| new_job_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_server_status_mapping() {
        assert_eq!(TrainingStatus::from(JobStatus::Processing), TrainingStatus::Training);
        assert_eq!(TrainingStatus::from(JobStatus::Completed), TrainingStatus::Completed);
        assert!(TrainingStatus::Failed.is_terminal());
        assert!(!TrainingStatus::Queued.is_terminal());
    }

    #[test]
    fn test_serialized_shape() {
        let job = TrainingJob::new("Narrator");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["name"], "Narrator");
        assert_eq!(value["status"], "queued");
        assert!(value["createdAt"].is_string());
        assert!(value.get("completedAt").is_none());
        assert!(value.get("serverJobId").is_none());
    }
}

pub mod api;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod poller;
pub mod registry;
pub mod session;
pub mod task;
pub mod voice;

use api::{VoiceApiClient, VoiceBackend};
use config::{AppConfig, ConfigError};
use registry::{FileJobStore, JobStore, TrainingJobRegistry};
use session::{GenerationSession, TrainingSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use error::{JobError, UserMessage};

/// Everything the pages share: the backend, the training job registry and the configuration.
pub struct VoiceStudio {
    config: AppConfig,
    config_path: Option<PathBuf>,
    backend: Arc<dyn VoiceBackend>,
    registry: TrainingJobRegistry,
}

impl VoiceStudio {
    /// Load `.env`, the config file and the persisted training jobs from their usual places.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config_path = config::config_path()?;
        let mut config = config::load_or_create(&config_path)?;
        config::apply_env_overrides(&mut config);

        let store = FileJobStore::new(config::jobs_path()?);
        Ok(Self::from_config(config, Some(config_path), Box::new(store)))
    }

    /// Build against the HTTP backend described by `config`.
    pub fn from_config(
        config: AppConfig,
        config_path: Option<PathBuf>,
        store: Box<dyn JobStore>,
    ) -> Self {
        let client = VoiceApiClient::new(config.api_base_url.clone(), config::decode_api_key(&config));
        Self::with_backend(config, config_path, Arc::new(client), store)
    }

    pub fn with_backend(
        config: AppConfig,
        config_path: Option<PathBuf>,
        backend: Arc<dyn VoiceBackend>,
        store: Box<dyn JobStore>,
    ) -> Self {
        let registry = TrainingJobRegistry::new(store, config.simulation_config());
        tracing::info!(
            "Voice studio ready: api={}, {} training jobs",
            config.api_base_url,
            registry.len()
        );

        Self {
            config,
            config_path,
            backend,
            registry,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn registry(&self) -> &TrainingJobRegistry {
        &self.registry
    }

    pub fn generation_session(&self) -> GenerationSession {
        GenerationSession::new(
            self.backend.clone(),
            self.config.poller_config(),
            self.config_path.clone(),
        )
    }

    pub fn training_session(&self) -> TrainingSession {
        TrainingSession::new(
            self.backend.clone(),
            self.registry.clone(),
            self.config.poller_config(),
            self.config_path.clone(),
        )
    }

    /// Whether the backend answers its health check.
    pub async fn check_connection(&self) -> bool {
        if !self.config.is_api_configured() {
            tracing::warn!("No API URL configured");
            return false;
        }
        let healthy = self.backend.health().await;
        if !healthy {
            tracing::warn!("Backend at {} is unreachable", self.config.api_base_url);
        }
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JobStatus;
    use crate::registry::{MemoryJobStore, TrainingStatus};
    use crate::session::testing::{job, wav_file, FakeBackend};
    use tempfile::TempDir;

    fn studio(backend: Arc<FakeBackend>, store: MemoryJobStore) -> VoiceStudio {
        let config = AppConfig {
            simulate_training_progress: false,
            ..AppConfig::default()
        };
        VoiceStudio::with_backend(config, None, backend, Box::new(store))
    }

    #[tokio::test]
    async fn test_check_connection() {
        let backend = Arc::new(FakeBackend::new(job("x", JobStatus::Queued, 0.0, None), vec![]));
        assert!(studio(backend, MemoryJobStore::new()).check_connection().await);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_reported() {
        let config = AppConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            simulate_training_progress: false,
            ..AppConfig::default()
        };
        let studio = VoiceStudio::from_config(config, None, Box::new(MemoryJobStore::new()));
        assert!(!studio.check_connection().await);
    }

    #[tokio::test]
    async fn test_sessions_share_the_registry() {
        let backend = Arc::new(FakeBackend::new(
            job("t-9", JobStatus::Completed, 100.0, None),
            vec![],
        ));
        let studio = studio(backend, MemoryJobStore::new());
        let dir = TempDir::new().unwrap();

        let mut first = studio.training_session();
        first
            .upload_reference(wav_file(&dir, "a.wav"))
            .await
            .unwrap();
        let id = first.start_training("shared").await.unwrap();

        let second = studio.training_session();
        let job = second.registry().get_job(&id).unwrap();
        assert_eq!(job.status, TrainingStatus::Completed);
        assert_eq!(studio.registry().find_by_server_id("t-9").unwrap().id, id);
    }

    #[test]
    fn test_rehydrates_persisted_jobs() {
        let raw = r#"[{"id":"job-1-abcdefghi","name":"Old","status":"training","progress":12.5,"createdAt":"2024-03-01T10:00:00Z"}]"#;
        let backend = Arc::new(FakeBackend::new(job("x", JobStatus::Queued, 0.0, None), vec![]));
        let studio = studio(backend, MemoryJobStore::with_raw(raw));

        let jobs = studio.registry().list_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "Old");
        assert_eq!(jobs[0].progress, 12.5);
    }
}

use crate::audio::ReferenceAudioNote;
use crate::poller::PollerConfig;
use crate::registry::SimulationConfig;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const APP_DIR: &str = "voice-studio";
const CONFIG_FILE: &str = "config.json";
const JOBS_FILE: &str = "training-jobs.json";
const API_KEY_XOR_KEY: &[u8] = b"voice-studio-local-key-v1";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_SIMULATION_TICK_MS: u64 = 1_000;

pub const ENV_API_URL: &str = "VOICE_STUDIO_API_URL";
pub const ENV_API_KEY: &str = "VOICE_STUDIO_API_KEY";
pub const ENV_POLL_INTERVAL_MS: &str = "VOICE_STUDIO_POLL_INTERVAL_MS";
pub const ENV_POLL_TIMEOUT_MS: &str = "VOICE_STUDIO_POLL_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to resolve {0} directory")]
    NoDirectory(&'static str),

    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_key_obfuscated: Option<String>,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub simulate_training_progress: bool,
    pub simulation_tick_ms: u64,
    pub last_reference_audio: Option<ReferenceAudioNote>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_key_obfuscated: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            simulate_training_progress: true,
            simulation_tick_ms: DEFAULT_SIMULATION_TICK_MS,
            last_reference_audio: None,
        }
    }
}

impl AppConfig {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }

    pub fn simulation_config(&self) -> Option<SimulationConfig> {
        self.simulate_training_progress
            .then(|| SimulationConfig::with_tick(Duration::from_millis(self.simulation_tick_ms)))
    }

    pub fn is_api_configured(&self) -> bool {
        !self.api_base_url.trim().is_empty()
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoDirectory("config"))?;
    Ok(dir.join(APP_DIR).join(CONFIG_FILE))
}

pub fn jobs_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::data_dir().ok_or(ConfigError::NoDirectory("data"))?;
    Ok(dir.join(APP_DIR).join(JOBS_FILE))
}

/// Read the config at `path`, creating it with defaults when missing.
///
/// A file that no longer parses is kept as `config.json.bak` and replaced by defaults.
pub fn load_or_create(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        let config = AppConfig::default();
        save(path, &config)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(path)?;
    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!("Config at {:?} is malformed, resetting: {}", path, e);
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(path, backup);
            let config = AppConfig::default();
            save(path, &config)?;
            Ok(config)
        }
    }
}

pub fn save(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

/// Environment values win over the file. Never written back to disk.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(url) = env_value(ENV_API_URL) {
        config.api_base_url = url;
    }

    if let Some(key) = env_value(ENV_API_KEY) {
        config.api_key_obfuscated = Some(obfuscate_api_key(&key));
    }

    if let Some(ms) = env_value(ENV_POLL_INTERVAL_MS).and_then(|v| v.parse().ok()) {
        config.poll_interval_ms = ms;
    }

    if let Some(ms) = env_value(ENV_POLL_TIMEOUT_MS).and_then(|v| v.parse().ok()) {
        config.poll_timeout_ms = ms;
    }

    normalize_config(config);
}

/// Store a new backend location and key. An empty key clears the stored one.
pub fn set_api_config(path: &Path, base_url: &str, api_key: &str) -> Result<AppConfig, ConfigError> {
    let mut config = load_or_create(path)?;
    config.api_base_url = base_url.to_string();

    let trimmed = api_key.trim();
    config.api_key_obfuscated = if trimmed.is_empty() {
        None
    } else {
        Some(obfuscate_api_key(trimmed))
    };

    normalize_config(&mut config);
    save(path, &config)?;
    Ok(config)
}

pub fn record_reference_audio(path: &Path, note: ReferenceAudioNote) -> Result<(), ConfigError> {
    let mut config = load_or_create(path)?;
    config.last_reference_audio = Some(note);
    save(path, &config)
}

pub fn decode_api_key(config: &AppConfig) -> Option<String> {
    config
        .api_key_obfuscated
        .as_deref()
        .and_then(deobfuscate_api_key)
}

pub fn masked_api_key(config: &AppConfig) -> Option<String> {
    decode_api_key(config).map(|key| mask_api_key(&key))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_config(config: &mut AppConfig) {
    let url = config.api_base_url.trim().trim_end_matches('/');
    config.api_base_url = if url.is_empty() {
        DEFAULT_API_URL.to_string()
    } else {
        url.to_string()
    };

    if config.poll_interval_ms == 0 {
        config.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
    }
    if config.poll_timeout_ms < config.poll_interval_ms {
        config.poll_timeout_ms = DEFAULT_POLL_TIMEOUT_MS.max(config.poll_interval_ms);
    }
    if config.simulation_tick_ms == 0 {
        config.simulation_tick_ms = DEFAULT_SIMULATION_TICK_MS;
    }
}

fn obfuscate_api_key(api_key: &str) -> String {
    let mut bytes = api_key.as_bytes().to_vec();
    for (idx, byte) in bytes.iter_mut().enumerate() {
        *byte ^= API_KEY_XOR_KEY[idx % API_KEY_XOR_KEY.len()];
    }
    BASE64_STANDARD.encode(bytes)
}

fn deobfuscate_api_key(obfuscated: &str) -> Option<String> {
    let mut bytes = BASE64_STANDARD.decode(obfuscated).ok()?;
    for (idx, byte) in bytes.iter_mut().enumerate() {
        *byte ^= API_KEY_XOR_KEY[idx % API_KEY_XOR_KEY.len()];
    }
    String::from_utf8(bytes).ok()
}

fn mask_api_key(api_key: &str) -> String {
    if api_key.len() <= 10 || !api_key.is_ascii() {
        return "******".to_string();
    }

    let prefix = &api_key[..6];
    let suffix = &api_key[api_key.len().saturating_sub(4)..];
    format!("{}********{}", prefix, suffix)
}

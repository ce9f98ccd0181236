//! Command line front end for manual use against a running backend.

use crate::config::{self, ConfigError};
use crate::error::JobError;
use crate::poller::PollProgress;
use crate::registry::TrainingJob;
use crate::voice::{Accent, VoiceSettings, VoiceSettingsError};
use crate::VoiceStudio;
use thiserror::Error;
use tokio::sync::watch;

pub const USAGE: &str = "\
Usage:
  voice-studio upload <file>
  voice-studio generate <file> <accent> <prompt...>
  voice-studio train <file> <model-name>
  voice-studio jobs
  voice-studio cancel <job-id>
  voice-studio health
  voice-studio config [<api-url> [<api-key>]]";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Settings(#[from] VoiceSettingsError),

    #[error("Backend is unreachable")]
    Unreachable,
}

/// Run one command. Returns the process exit code.
pub async fn run(args: &[String]) -> i32 {
    match dispatch(args).await {
        Ok(()) => 0,
        Err(CliError::Usage(usage)) => {
            eprintln!("{}", usage);
            1
        }
        Err(CliError::Job(e)) => {
            let message = e.user_message();
            tracing::debug!("Command failed: {}", e);
            eprintln!("{}: {}", message.title, message.description);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn dispatch(args: &[String]) -> Result<(), CliError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["config"] => show_config(),
        ["config", url] => update_config(url, ""),
        ["config", url, key] => update_config(url, key),
        ["health"] => health(&VoiceStudio::from_env()?).await,
        ["jobs"] => {
            list_jobs(&VoiceStudio::from_env()?.registry().list_jobs());
            Ok(())
        }
        ["upload", file] => upload(&VoiceStudio::from_env()?, file).await,
        ["generate", file, accent, prompt @ ..] if !prompt.is_empty() => {
            let settings = VoiceSettings::new(accent.parse::<Accent>()?);
            generate(&VoiceStudio::from_env()?, file, &prompt.join(" "), &settings).await
        }
        ["train", file, name @ ..] if !name.is_empty() => {
            train(&VoiceStudio::from_env()?, file, &name.join(" ")).await
        }
        ["cancel", id] => cancel(&VoiceStudio::from_env()?, id).await,
        _ => Err(CliError::Usage(USAGE)),
    }
}

fn show_config() -> Result<(), CliError> {
    let path = config::config_path()?;
    let mut current = config::load_or_create(&path)?;
    config::apply_env_overrides(&mut current);

    println!("config:   {}", path.display());
    println!("api url:  {}", current.api_base_url);
    println!(
        "api key:  {}",
        config::masked_api_key(&current).unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "polling:  every {}ms, give up after {}ms",
        current.poll_interval_ms, current.poll_timeout_ms
    );
    if let Some(note) = current.last_reference_audio {
        println!(
            "last reference: {} ({}, uploaded {})",
            note.file_name,
            note.server_id,
            note.uploaded_at.to_rfc3339()
        );
    }
    Ok(())
}

fn update_config(url: &str, key: &str) -> Result<(), CliError> {
    let path = config::config_path()?;
    let updated = config::set_api_config(&path, url, key)?;
    println!("API url set to {}", updated.api_base_url);
    Ok(())
}

async fn health(studio: &VoiceStudio) -> Result<(), CliError> {
    if studio.check_connection().await {
        println!("Backend at {} is healthy", studio.config().api_base_url);
        Ok(())
    } else {
        Err(CliError::Unreachable)
    }
}

async fn upload(studio: &VoiceStudio, file: &str) -> Result<(), CliError> {
    let mut session = studio.generation_session();
    let audio = session.upload_reference(file).await?;
    println!(
        "{} uploaded as {}",
        audio.file_name,
        audio.server_id.as_deref().unwrap_or_default()
    );
    Ok(())
}

async fn generate(
    studio: &VoiceStudio,
    file: &str,
    prompt: &str,
    settings: &VoiceSettings,
) -> Result<(), CliError> {
    let mut session = studio.generation_session();
    session.upload_reference(file).await?;
    session.set_prompt(prompt);

    let job_id = session.submit(settings).await?;
    println!("Generating {} ({} accent)", job_id, settings.accent);

    let reporter = session.progress().map(|rx| tokio::spawn(report_progress(rx)));
    let result = session.wait_for_result().await;
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    let result = result?;
    println!("Done: {}", result.audio_url);
    Ok(())
}

async fn train(studio: &VoiceStudio, file: &str, name: &str) -> Result<(), CliError> {
    let mut session = studio.training_session();
    session.upload_reference(file).await?;

    let id = session.start_training(name).await?;
    println!("Training '{}' as {}", name, id);

    let job = session.wait_for(&id).await?;
    list_jobs(std::slice::from_ref(&job));
    Ok(())
}

async fn cancel(studio: &VoiceStudio, id: &str) -> Result<(), CliError> {
    let mut session = studio.training_session();
    if session.cancel_training(id).await? {
        println!("Cancelled {}", id);
    } else {
        println!("The server did not cancel {}", id);
    }
    Ok(())
}

async fn report_progress(mut rx: watch::Receiver<PollProgress>) {
    while rx.changed().await.is_ok() {
        let progress = rx.borrow_and_update().clone();
        println!("  {:>5.1}%  {}", progress.progress, progress.phase);
    }
}

fn list_jobs(jobs: &[TrainingJob]) {
    if jobs.is_empty() {
        println!("No training jobs");
        return;
    }
    for job in jobs {
        println!(
            "{}  {:<10} {:>5.1}%  {}  (created {})",
            job.id,
            format!("{:?}", job.status).to_lowercase(),
            job.progress,
            job.name,
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unknown_command_is_usage_error() {
        assert!(matches!(
            dispatch(&args(&["frobnicate"])).await,
            Err(CliError::Usage(_))
        ));
        assert!(matches!(dispatch(&args(&[])).await, Err(CliError::Usage(_))));
        assert_eq!(run(&args(&["generate", "a.wav"])).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_accent_is_rejected() {
        let err = dispatch(&args(&["generate", "a.wav", "martian", "hello"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Settings(VoiceSettingsError::UnknownAccent(_))
        ));
    }
}

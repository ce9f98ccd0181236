use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Extensions accepted as reference audio.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "m4a", "ogg", "flac"];

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read audio file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio file is empty: {0}")]
    EmptyFile(PathBuf),
}

/// Reference audio picked by the user for the current session.
///
/// Lives only as long as the session; only a [`ReferenceAudioNote`] survives a restart.
#[derive(Debug, Clone)]
pub struct AudioFile {
    /// Locally generated id, never sent to the server
    pub local_id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    /// Playable location of the file
    pub url: String,
    /// Upload id assigned by the server, once uploaded
    pub server_id: Option<String>,
}

impl AudioFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let mime_type = mime_for_extension(&extension)
            .ok_or_else(|| AudioError::UnsupportedFormat(path.display().to_string()))?;

        let bytes = fs::read(path).map_err(|source| AudioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(AudioError::EmptyFile(path.to_path_buf()));
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("audio.{}", extension));

        let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        tracing::debug!("Loaded reference audio '{}' ({} bytes)", file_name, bytes.len());

        Ok(Self {
            local_id: format!("audio-{}", Uuid::new_v4()),
            path: path.to_path_buf(),
            file_name,
            mime_type,
            bytes,
            url: format!("file://{}", absolute.display()),
            server_id: None,
        })
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn note(&self) -> Option<ReferenceAudioNote> {
        self.server_id.as_ref().map(|server_id| ReferenceAudioNote {
            file_name: self.file_name.clone(),
            server_id: server_id.clone(),
            url: self.url.clone(),
            uploaded_at: Utc::now(),
        })
    }
}

/// What is remembered about the last uploaded reference audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceAudioNote {
    pub file_name: String,
    pub server_id: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "m4a" => Some("audio/mp4"),
        "ogg" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_supported_extensions_have_mime_types() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(mime_for_extension(ext).is_some(), "missing mime for {}", ext);
        }
    }

    #[test]
    fn test_load_wav_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "Voice.WAV", b"RIFF0000WAVE");

        let audio = AudioFile::from_path(&path).unwrap();
        assert_eq!(audio.file_name, "Voice.WAV");
        assert_eq!(audio.mime_type, "audio/wav");
        assert_eq!(audio.len(), 12);
        assert!(audio.local_id.starts_with("audio-"));
        assert!(audio.url.starts_with("file://"));
        assert!(audio.server_id.is_none());
        assert!(audio.note().is_none());
    }

    #[test]
    fn test_rejects_unsupported_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let text = write_temp(dir.path(), "notes.txt", b"hello");
        assert!(matches!(
            AudioFile::from_path(&text),
            Err(AudioError::UnsupportedFormat(_))
        ));

        let empty = write_temp(dir.path(), "silence.mp3", b"");
        assert!(matches!(
            AudioFile::from_path(&empty),
            Err(AudioError::EmptyFile(_))
        ));

        let missing = dir.path().join("missing.flac");
        assert!(matches!(
            AudioFile::from_path(&missing),
            Err(AudioError::Io { .. })
        ));
    }

    #[test]
    fn test_note_after_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "take.ogg", b"OggS");

        let audio = AudioFile::from_path(&path).unwrap().with_server_id("srv-1");
        let note = audio.note().unwrap();
        assert_eq!(note.file_name, "take.ogg");
        assert_eq!(note.server_id, "srv-1");
        assert_eq!(note.url, audio.url);
    }
}

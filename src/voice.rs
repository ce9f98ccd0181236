use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;
/// Semitones either side of the reference voice.
pub const MAX_PITCH_SHIFT: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    American,
    British,
    Australian,
    Canadian,
    Irish,
}

impl Accent {
    pub const ALL: [Accent; 5] = [
        Accent::American,
        Accent::British,
        Accent::Australian,
        Accent::Canadian,
        Accent::Irish,
    ];

    pub fn value(self) -> &'static str {
        match self {
            Accent::American => "american",
            Accent::British => "british",
            Accent::Australian => "australian",
            Accent::Canadian => "canadian",
            Accent::Irish => "irish",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Accent::American => "American",
            Accent::British => "British",
            Accent::Australian => "Australian",
            Accent::Canadian => "Canadian",
            Accent::Irish => "Irish",
        }
    }
}

impl fmt::Display for Accent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Accent {
    type Err = VoiceSettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Accent::ALL
            .into_iter()
            .find(|accent| accent.value() == wanted)
            .ok_or_else(|| VoiceSettingsError::UnknownAccent(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

#[derive(Debug, Error, PartialEq)]
pub enum VoiceSettingsError {
    #[error("Unknown accent: {0}")]
    UnknownAccent(String),

    #[error("Speed {0} outside 0.5..=2.0")]
    SpeedOutOfRange(f32),

    #[error("Pitch shift {0} outside -12..=12 semitones")]
    PitchOutOfRange(f32),
}

/// Generation parameters picked on the accent generator page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub accent: Accent,
    pub gender: Gender,
    pub speed: f32,
    pub pitch: f32,
}

impl VoiceSettings {
    pub fn new(accent: Accent) -> Self {
        Self {
            accent,
            gender: Gender::default(),
            speed: 1.0,
            pitch: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), VoiceSettingsError> {
        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(VoiceSettingsError::SpeedOutOfRange(self.speed));
        }
        if !self.pitch.is_finite() || self.pitch.abs() > MAX_PITCH_SHIFT {
            return Err(VoiceSettingsError::PitchOutOfRange(self.pitch));
        }
        Ok(())
    }
}

//! Voice Synthesis Parameters
//!
//! Parameters for narration synthesis. The text itself travels separately
//! so the same params can be reused across every scene of a run.

use serde::{Deserialize, Serialize};

/// Output audio container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Opus,
}

impl AudioFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Opus => "opus",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Parameters for voice synthesis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechParams {
    /// Voice identifier; providers fall back to their default voice
    pub voice: Option<String>,
    /// Model override
    pub model: Option<String>,
    /// Speaking speed multiplier (1.0 is normal)
    pub speed: Option<f32>,
    /// Output format
    pub format: AudioFormat,
}

impl SpeechParams {
    /// Creates default params
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the voice
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Sets the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the speaking speed
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Sets the output format
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Validates the parameters
    pub fn validate(&self) -> Result<(), String> {
        if let Some(speed) = self.speed {
            if !(0.25..=4.0).contains(&speed) {
                return Err("Speed must be between 0.25 and 4.0".to_string());
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_extension() {
        assert_eq!(AudioFormat::Mp3.extension(), "mp3");
        assert_eq!(AudioFormat::Wav.extension(), "wav");
        assert_eq!(AudioFormat::Opus.extension(), "opus");
    }

    #[test]
    fn test_format_serialization() {
        assert_eq!(serde_json::to_string(&AudioFormat::Mp3).unwrap(), "\"mp3\"");
        assert_eq!(
            serde_json::from_str::<AudioFormat>("\"wav\"").unwrap(),
            AudioFormat::Wav
        );
    }

    #[test]
    fn test_params_default() {
        let params = SpeechParams::new();
        assert!(params.voice.is_none());
        assert_eq!(params.format, AudioFormat::Mp3);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_builder() {
        let params = SpeechParams::new()
            .with_voice("alloy")
            .with_model("tts-1")
            .with_speed(1.25)
            .with_format(AudioFormat::Wav);

        assert_eq!(params.voice.as_deref(), Some("alloy"));
        assert_eq!(params.model.as_deref(), Some("tts-1"));
        assert_eq!(params.speed, Some(1.25));
        assert_eq!(params.format, AudioFormat::Wav);
    }

    #[test]
    fn test_validate_speed_range() {
        assert!(SpeechParams::new().with_speed(0.1).validate().is_err());
        assert!(SpeechParams::new().with_speed(5.0).validate().is_err());
        assert!(SpeechParams::new().with_speed(1.0).validate().is_ok());
    }
}

//! Video Generation Parameters
//!
//! Parameters shared by text-to-video and image-to-video operations.

use serde::{Deserialize, Serialize};

/// Minimum requested clip duration in seconds
pub const MIN_DURATION_SECS: f64 = 1.0;
/// Maximum requested clip duration in seconds
pub const MAX_DURATION_SECS: f64 = 120.0;

/// Aspect ratios providers commonly accept
pub const SUPPORTED_ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1", "4:3", "3:4"];

/// Parameters for video generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoGenerationParams {
    /// Prompt or full script; optional guidance when animating an image
    pub prompt: String,
    /// Requested total duration in seconds
    pub duration_seconds: Option<f64>,
    /// Aspect ratio, e.g. "16:9"
    pub aspect_ratio: Option<String>,
    /// Model override
    pub model: Option<String>,
}

impl VideoGenerationParams {
    /// Creates params with just a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            duration_seconds: None,
            aspect_ratio: None,
            model: None,
        }
    }

    /// Sets the requested duration
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Sets the aspect ratio
    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }

    /// Sets the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Validates for text-to-video, where the prompt is the script
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Prompt cannot be empty".to_string());
        }
        if self.prompt.len() > 4096 {
            return Err("Prompt too long (max 4096 characters)".to_string());
        }
        self.validate_image_conditioned()
    }

    /// Validates for image-to-video, where the prompt is optional guidance
    pub fn validate_image_conditioned(&self) -> Result<(), String> {
        if let Some(d) = self.duration_seconds {
            if !d.is_finite() || !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&d) {
                return Err(format!(
                    "Duration must be between {} and {} seconds",
                    MIN_DURATION_SECS, MAX_DURATION_SECS
                ));
            }
        }

        if let Some(ratio) = &self.aspect_ratio {
            if !SUPPORTED_ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(format!(
                    "Unsupported aspect ratio '{}' (supported: {})",
                    ratio,
                    SUPPORTED_ASPECT_RATIOS.join(", ")
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

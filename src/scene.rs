//! Scene Model
//!
//! A scene is one planned segment of the final video: a visual description
//! for image synthesis, narration text for voice synthesis, and a duration.

use serde::{Deserialize, Serialize};

/// Duration applied when the planning provider omits one
pub const DEFAULT_SCENE_DURATION_SECS: f64 = 4.0;

fn default_scene_duration() -> f64 {
    DEFAULT_SCENE_DURATION_SECS
}

/// One planned segment of the final video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Zero-based position in the final video
    pub index: usize,
    /// What the scene should show, used as the image synthesis prompt
    pub visual_description: String,
    /// Narration spoken over the scene; empty means no voice track
    #[serde(default)]
    pub voiceover_text: String,
    /// Scene length in seconds
    #[serde(default = "default_scene_duration")]
    pub duration_seconds: f64,
}

impl Scene {
    /// Creates a scene with the default duration and no narration
    pub fn new(index: usize, visual_description: impl Into<String>) -> Self {
        Self {
            index,
            visual_description: visual_description.into(),
            voiceover_text: String::new(),
            duration_seconds: DEFAULT_SCENE_DURATION_SECS,
        }
    }

    /// Sets the narration text
    pub fn with_voiceover(mut self, text: impl Into<String>) -> Self {
        self.voiceover_text = text.into();
        self
    }

    /// Sets the duration
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    /// Returns true when the scene carries narration worth synthesizing
    pub fn has_voiceover(&self) -> bool {
        !self.voiceover_text.trim().is_empty()
    }
}

/// Sums the durations of a planned scene list
pub fn total_duration(scenes: &[Scene]) -> f64 {
    scenes.iter().map(|s| s.duration_seconds).sum()
}

// ============================================================================
// Tests
// ============================================================================

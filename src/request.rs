//! Generation Requests
//!
//! The tagged request/result unions dispatched through the engine and
//! consumed by the cost guard.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::planner::ScenePlanParams;
use crate::provider::MediaCapability;
use crate::scene::Scene;
use crate::speech::SpeechParams;
use crate::video::VideoGenerationParams;

/// A generation request, owned transiently by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationRequest {
    /// Full script to finished video
    TextToVideo { params: VideoGenerationParams },
    /// Animate a still image
    ImageToVideo {
        image: PathBuf,
        params: VideoGenerationParams,
    },
    /// Turn a script into an ordered scene list
    ScenePlanning {
        script: String,
        params: ScenePlanParams,
    },
    /// Synthesize narration audio
    VoiceSynthesis { text: String, params: SpeechParams },
}

impl GenerationRequest {
    /// Returns the capability a provider needs to serve this request
    pub fn required_capability(&self) -> MediaCapability {
        match self {
            GenerationRequest::TextToVideo { .. } => MediaCapability::TextToVideo,
            GenerationRequest::ImageToVideo { .. } => MediaCapability::ImageToVideo,
            GenerationRequest::ScenePlanning { .. } => MediaCapability::ScenePlanning,
            GenerationRequest::VoiceSynthesis { .. } => MediaCapability::VoiceSynthesis,
        }
    }

    /// Validates the request before any network call
    pub fn validate(&self) -> Result<(), String> {
        match self {
            GenerationRequest::TextToVideo { params } => params.validate(),
            GenerationRequest::ImageToVideo { image, params } => {
                if image.as_os_str().is_empty() {
                    return Err("Image path cannot be empty".to_string());
                }
                params.validate_image_conditioned()
            }
            GenerationRequest::ScenePlanning { script, params } => {
                if script.trim().is_empty() {
                    return Err("Script cannot be empty".to_string());
                }
                params.validate()
            }
            GenerationRequest::VoiceSynthesis { text, params } => {
                if text.trim().is_empty() {
                    return Err("Text cannot be empty".to_string());
                }
                if text.len() > 4096 {
                    return Err("Text too long (max 4096 characters)".to_string());
                }
                params.validate()
            }
        }
    }

    /// Request descriptors attached to usage records
    pub fn metadata(&self) -> serde_json::Value {
        match self {
            GenerationRequest::TextToVideo { params } => serde_json::json!({
                "type": "text_to_video",
                "duration": params.duration_seconds,
            }),
            GenerationRequest::ImageToVideo { image, .. } => serde_json::json!({
                "type": "image_to_video",
                "path": image.display().to_string(),
            }),
            GenerationRequest::ScenePlanning { script, .. } => serde_json::json!({
                "type": "scene_planning",
                "script_chars": script.len(),
            }),
            GenerationRequest::VoiceSynthesis { text, .. } => serde_json::json!({
                "type": "voice_synthesis",
                "text_chars": text.len(),
            }),
        }
    }
}

/// The result of a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationResult {
    /// A finished video file
    Video { path: PathBuf },
    /// An ordered scene list
    ScenePlan { scenes: Vec<Scene> },
    /// A narration audio file
    Voice { path: PathBuf },
}

impl GenerationResult {
    /// Local artifact path, when the result is a file
    pub fn artifact_path(&self) -> Option<&Path> {
        match self {
            GenerationResult::Video { path } => Some(path),
            GenerationResult::Voice { path } => Some(path),
            GenerationResult::ScenePlan { .. } => None,
        }
    }

    /// Planned scenes, when the result is a scene plan
    pub fn scenes(&self) -> Option<&[Scene]> {
        match self {
            GenerationResult::ScenePlan { scenes } => Some(scenes),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

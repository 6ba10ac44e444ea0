//! OpenAI Provider
//!
//! Adapter for the OpenAI REST API: DALL-E still images, chat completions
//! for scene planning, speech synthesis, and the synchronous video
//! generation endpoint. Video responses carry either a download URL or an
//! inline base64 payload; both resolve to a local file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;
use ulid::Ulid;

use crate::config::ProviderSettings;
use crate::error::{ForgeError, ForgeResult};
use crate::image::ImageGenerationParams;
use crate::planner::{director_prompt, parse_scene_plan, ScenePlanParams, DIRECTOR_SYSTEM_PROMPT};
use crate::poller::{decode_base64_to_file, download_to_file};
use crate::provider::{MediaCapability, MediaProvider};
use crate::providers::{parse_api_error, read_response};
use crate::request::GenerationRequest;
use crate::scene::Scene;
use crate::speech::SpeechParams;
use crate::video::VideoGenerationParams;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the OpenAI API
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default video generation model
const DEFAULT_VIDEO_MODEL: &str = "sora-1.0-turbo";

/// Default still-image model
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Default scene planning model
const DEFAULT_PLANNING_MODEL: &str = "gpt-4o";

/// Default speech model and voice
const DEFAULT_VOICE_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

/// Motion guidance sent when animating an image without a prompt
const DEFAULT_ANIMATE_PROMPT: &str = "Animate this image";

/// Flat estimate for one video generation, USD
const VIDEO_COST: f64 = 0.50;

/// Planning estimate: per-1K-input-token rate plus a fixed overhead
const PLANNING_COST_PER_1K_TOKENS: f64 = 0.01;
const PLANNING_BASE_COST: f64 = 0.03;

/// Voice estimate per 1K input characters, USD
const VOICE_COST_PER_1K_CHARS: f64 = 0.015;

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    response_format: String,
}

#[derive(Debug, Serialize)]
struct VideoRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
}

/// Images and videos share the `data[0].{b64_json,url}` response shape
#[derive(Debug, Deserialize)]
struct MediaResponse {
    #[serde(default)]
    data: Vec<MediaDatum>,
}

#[derive(Debug, Deserialize)]
struct MediaDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest {
    model: String,
    input: String,
    voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
    response_format: String,
}

// ============================================================================
// OpenAiProvider
// ============================================================================

/// OpenAI adapter
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Planning model; per-request params override individual operations
    chat_model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Creates a provider with default settings and the given API key
    pub fn new(api_key: impl Into<String>) -> ForgeResult<Self> {
        Self::from_settings(&ProviderSettings::default().with_api_key(api_key))
    }

    /// Creates a provider from settings
    pub fn from_settings(settings: &ProviderSettings) -> ForgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ForgeError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone().unwrap_or_default(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_PLANNING_MODEL.to_string()),
        })
    }

    /// Sets a custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: Serialize>(&self, path: &str, request: &T) -> ForgeResult<String> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(format!("OpenAI request failed: {}", e)))?;

        read_response("OpenAI", resp).await
    }

    /// Resolves a media datum to a local file, inline payload preferred
    async fn resolve_media(&self, datum: &MediaDatum, dest: &Path, what: &str) -> ForgeResult<()> {
        if let Some(b64) = &datum.b64_json {
            decode_base64_to_file(b64, dest).await?;
            return Ok(());
        }
        if let Some(url) = &datum.url {
            download_to_file(&self.client, url, dest).await?;
            return Ok(());
        }
        Err(ForgeError::MalformedProviderResponse(format!(
            "OpenAI returned no {} data",
            what
        )))
    }

    async fn submit_video(
        &self,
        request: &VideoRequest,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        let body = self.post_json("/videos/generations", request).await?;
        let parsed: MediaResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Invalid OpenAI video response: {}", e))
        })?;
        let datum = parsed.data.first().ok_or_else(|| {
            ForgeError::MalformedProviderResponse("OpenAI returned no video data".to_string())
        })?;

        let path = workdir.join(format!("sora_{}.mp4", Ulid::new()));
        self.resolve_media(datum, &path, "video").await?;
        info!(path = %path.display(), "video generated");
        Ok(path)
    }
}

/// Maps an aspect ratio onto the video size parameter; portrait default
fn video_size(aspect_ratio: Option<&str>) -> &'static str {
    match aspect_ratio {
        Some("16:9") => "1920x1080",
        Some("1:1") => "1080x1080",
        Some("4:3") => "1440x1080",
        Some("3:4") => "1080x1440",
        _ => "1080x1920",
    }
}

#[async_trait]
impl MediaProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        vec![
            MediaCapability::TextToVideo,
            MediaCapability::ImageToVideo,
            MediaCapability::TextToImage,
            MediaCapability::ScenePlanning,
            MediaCapability::VoiceSynthesis,
        ]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        match request {
            GenerationRequest::TextToVideo { .. } | GenerationRequest::ImageToVideo { .. } => {
                VIDEO_COST
            }
            GenerationRequest::ScenePlanning { script, .. } => {
                let input_tokens = script.len() as f64 / 4.0;
                (input_tokens / 1000.0) * PLANNING_COST_PER_1K_TOKENS + PLANNING_BASE_COST
            }
            GenerationRequest::VoiceSynthesis { text, .. } => {
                (text.len() as f64 / 1000.0) * VOICE_COST_PER_1K_CHARS
            }
        }
    }

    async fn text_to_video(
        &self,
        params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let request = VideoRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
            prompt: params.prompt.clone(),
            image: None,
            size: video_size(params.aspect_ratio.as_deref()).to_string(),
            quality: Some("standard".to_string()),
        };
        self.submit_video(&request, workdir).await
    }

    async fn image_to_video(
        &self,
        image: &Path,
        params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        params
            .validate_image_conditioned()
            .map_err(ForgeError::ValidationError)?;

        let bytes = tokio::fs::read(image).await?;
        let prompt = if params.prompt.trim().is_empty() {
            DEFAULT_ANIMATE_PROMPT.to_string()
        } else {
            params.prompt.clone()
        };

        let request = VideoRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
            prompt,
            image: Some(BASE64.encode(&bytes)),
            size: video_size(params.aspect_ratio.as_deref()).to_string(),
            quality: None,
        };
        self.submit_video(&request, workdir).await
    }

    async fn generate_image(
        &self,
        params: &ImageGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let request = ImageRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            prompt: params.prompt.clone(),
            n: 1,
            size: params.size_string(),
            // Prefer inline payloads over a second download round-trip
            response_format: "b64_json".to_string(),
        };

        let body = self.post_json("/images/generations", &request).await?;
        let parsed: MediaResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Invalid OpenAI image response: {}", e))
        })?;
        let datum = parsed.data.first().ok_or_else(|| {
            ForgeError::MalformedProviderResponse("OpenAI returned no image data".to_string())
        })?;

        let path = workdir.join(format!("openai_image_{}.png", Ulid::new()));
        self.resolve_media(datum, &path, "image").await?;
        info!(path = %path.display(), "image generated");
        Ok(path)
    }

    async fn generate_scenes(
        &self,
        script: &str,
        params: &ScenePlanParams,
    ) -> ForgeResult<Vec<Scene>> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let request = ChatRequest {
            model: params.model.clone().unwrap_or_else(|| self.chat_model.clone()),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: DIRECTOR_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: director_prompt(script, params),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let body = self.post_json("/chat/completions", &request).await?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Invalid OpenAI chat response: {}", e))
        })?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| {
                ForgeError::MalformedProviderResponse(
                    "OpenAI returned no completion choices".to_string(),
                )
            })?;

        parse_scene_plan(content)
    }

    async fn generate_voice(
        &self,
        text: &str,
        params: &SpeechParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let request = SpeechRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE_MODEL.to_string()),
            input: text.to_string(),
            voice: params
                .voice
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            speed: params.speed,
            response_format: params.format.extension().to_string(),
        };

        // Speech responses are raw audio bytes, not JSON
        let resp = self
            .client
            .post(self.endpoint("/audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(format!("OpenAI request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(parse_api_error("OpenAI", status, &body));
        }

        let bytes = resp.bytes().await.map_err(|e| {
            ForgeError::RequestFailed(format!("Failed to read audio stream: {}", e))
        })?;

        let path = workdir.join(format!(
            "openai_voice_{}.{}",
            Ulid::new(),
            params.format.extension()
        ));
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), chars = text.len(), "voice generated");
        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================

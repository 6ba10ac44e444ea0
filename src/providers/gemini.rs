//! Gemini Provider
//!
//! Adapter for the Google Gemini generateContent API, used here purely as a
//! scene planning backend. Gemini has no system role on this endpoint, so
//! the director instructions and the script prompt travel as one text part.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::error::{ForgeError, ForgeResult};
use crate::planner::{director_prompt, parse_scene_plan, ScenePlanParams, DIRECTOR_SYSTEM_PROMPT};
use crate::provider::{MediaCapability, MediaProvider};
use crate::providers::read_response;
use crate::request::GenerationRequest;
use crate::scene::Scene;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the Gemini API
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default planning model
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Flat estimate for one planning call, USD
const PLANNING_COST: f64 = 0.01;

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// ============================================================================
// GeminiProvider
// ============================================================================

/// Gemini adapter
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
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
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Sets a custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets a custom model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request URL; carries the API key as a query parameter, never log it
    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }
}

#[async_trait]
impl MediaProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        vec![MediaCapability::ScenePlanning]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        match request {
            GenerationRequest::ScenePlanning { .. } => PLANNING_COST,
            _ => 0.0,
        }
    }

    async fn generate_scenes(
        &self,
        script: &str,
        params: &ScenePlanParams,
    ) -> ForgeResult<Vec<Scene>> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let model = params.model.clone().unwrap_or_else(|| self.model.clone());
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!(
                        "{}\n\n{}",
                        DIRECTOR_SYSTEM_PROMPT,
                        director_prompt(script, params)
                    ),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let resp = self
            .client
            .post(self.generate_url(&model))
            .json(&request)
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(format!("Gemini request failed: {}", e)))?;
        let body = read_response("Gemini", resp).await?;

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Invalid Gemini response: {}", e))
        })?;
        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                ForgeError::MalformedProviderResponse(
                    "Gemini returned no candidates".to_string(),
                )
            })?;

        parse_scene_plan(text)
    }
}

// ============================================================================
// Tests
// ============================================================================

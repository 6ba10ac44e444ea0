//! Stability AI Provider
//!
//! Adapter for the Stability image-to-video API. Submission is a multipart
//! upload of the conditioning frame; the job is then polled at a result
//! endpoint that answers 202 while rendering and 200 with an inline base64
//! video once done.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::info;

use crate::config::ProviderSettings;
use crate::error::{ForgeError, ForgeResult};
use crate::poller::{decode_base64_to_file, AsyncJob, JobPoller};
use crate::provider::{MediaCapability, MediaProvider};
use crate::providers::{read_response, sanitize_job_id};
use crate::request::GenerationRequest;
use crate::video::VideoGenerationParams;

// ============================================================================
// Constants
// ============================================================================

/// Default endpoint; doubles as the submit URL
const DEFAULT_BASE_URL: &str = "https://api.stability.ai/v2beta/image-to-video";

/// Deterministic seed disabled by default
const DEFAULT_SEED: u32 = 0;

/// How strongly the video adheres to the conditioning frame
const DEFAULT_CFG_SCALE: f64 = 1.8;

/// Motion amount, 1..=255
const DEFAULT_MOTION_BUCKET_ID: u32 = 127;

/// Renders finish within a couple of minutes; cap polling accordingly
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Flat estimate for one animation, USD
const I2V_COST: f64 = 0.20;

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    video: Option<String>,
}

// ============================================================================
// StabilityProvider
// ============================================================================

/// Stability AI adapter
pub struct StabilityProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poller: JobPoller,
}

impl std::fmt::Debug for StabilityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StabilityProvider {
    /// Creates a provider with default settings and the given API key
    pub fn new(api_key: impl Into<String>) -> ForgeResult<Self> {
        Ok(
            Self::from_settings(&ProviderSettings::default().with_api_key(api_key))?
                .with_poller(JobPoller::new().with_max_attempts(DEFAULT_MAX_POLL_ATTEMPTS)),
        )
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
            poller: JobPoller::new()
                .with_interval(Duration::from_secs(settings.poll_interval_secs))
                .with_max_attempts(settings.max_poll_attempts),
        })
    }

    /// Sets a custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Replaces the polling schedule
    pub fn with_poller(mut self, poller: JobPoller) -> Self {
        self.poller = poller;
        self
    }

    fn result_url(&self, job_id: &str) -> String {
        format!("{}/result/{}", self.base_url, job_id)
    }
}

/// Interprets one poll of the result endpoint
fn parse_poll_response(job_id: &str, status: StatusCode, body: &str) -> ForgeResult<AsyncJob> {
    match status.as_u16() {
        202 => Ok(AsyncJob::pending(job_id)),
        200 => {
            let parsed: PollResponse = serde_json::from_str(body).map_err(|e| {
                ForgeError::MalformedProviderResponse(format!("Invalid Stability result: {}", e))
            })?;
            match parsed.video {
                Some(video) if !video.is_empty() => Ok(AsyncJob::succeeded(job_id, video)),
                _ => Err(ForgeError::MalformedProviderResponse(
                    "Stability result carried no video payload".to_string(),
                )),
            }
        }
        _ => {
            let detail: String = body.chars().take(500).collect();
            Ok(AsyncJob::failed(
                job_id,
                format!("HTTP {}: {}", status, detail),
            ))
        }
    }
}

#[async_trait]
impl MediaProvider for StabilityProvider {
    fn name(&self) -> &str {
        "stability"
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        vec![MediaCapability::ImageToVideo]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        match request {
            GenerationRequest::ImageToVideo { .. } => I2V_COST,
            _ => 0.0,
        }
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
        let filename = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.png")
            .to_string();
        let form = Form::new()
            .part("image", Part::bytes(bytes).file_name(filename))
            .text("seed", DEFAULT_SEED.to_string())
            .text("cfg_scale", DEFAULT_CFG_SCALE.to_string())
            .text("motion_bucket_id", DEFAULT_MOTION_BUCKET_ID.to_string());

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(format!("Stability request failed: {}", e)))?;
        let body = read_response("Stability", resp).await?;

        let submit: SubmitResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Invalid Stability response: {}", e))
        })?;
        if submit.id.is_empty() {
            return Err(ForgeError::MalformedProviderResponse(
                "Stability returned no job id".to_string(),
            ));
        }
        let job_id = submit.id;
        info!(job_id, "animation job submitted");

        let job = self
            .poller
            .poll(&job_id, |_attempt| {
                let client = self.client.clone();
                let url = self.result_url(&job_id);
                let key = self.api_key.clone();
                let id = job_id.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .bearer_auth(&key)
                        .header(reqwest::header::ACCEPT, "application/json")
                        .send()
                        .await
                        .map_err(|e| {
                            ForgeError::RequestFailed(format!("Stability poll failed: {}", e))
                        })?;
                    let status = resp.status();
                    let body = resp.text().await.map_err(|e| {
                        ForgeError::RequestFailed(format!(
                            "Failed to read Stability response: {}",
                            e
                        ))
                    })?;
                    parse_poll_response(&id, status, &body)
                }
            })
            .await?;

        let video_b64 = job.result_ref.ok_or_else(|| {
            ForgeError::MalformedProviderResponse(
                "Stability job succeeded without a payload".to_string(),
            )
        })?;

        let path = workdir.join(format!("stability_{}.mp4", sanitize_job_id(&job.id)));
        decode_base64_to_file(&video_b64, &path).await?;
        info!(job_id = %job.id, path = %path.display(), "video generated");
        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_capabilities() {
        let provider = StabilityProvider::new("sk-test").unwrap();
        assert_eq!(provider.name(), "stability");
        assert_eq!(provider.capabilities(), vec![MediaCapability::ImageToVideo]);
        assert!(!provider.supports(MediaCapability::TextToVideo));
    }

    #[test]
    fn test_availability_requires_key() {
        assert!(StabilityProvider::new("sk-test").unwrap().is_available());
        assert!(!StabilityProvider::new("").unwrap().is_available());
    }

    #[test]
    fn test_result_url() {
        let provider = StabilityProvider::new("sk-test").unwrap();
        assert_eq!(
            provider.result_url("abc123"),
            "https://api.stability.ai/v2beta/image-to-video/result/abc123"
        );

        let custom = StabilityProvider::new("sk-test")
            .unwrap()
            .with_base_url("http://localhost:7000/i2v");
        assert_eq!(custom.result_url("j1"), "http://localhost:7000/i2v/result/j1");
    }

    #[test]
    fn test_estimate_cost() {
        let provider = StabilityProvider::new("sk-test").unwrap();

        let i2v = GenerationRequest::ImageToVideo {
            image: PathBuf::from("/tmp/frame.png"),
            params: VideoGenerationParams::default(),
        };
        assert!((provider.estimate_cost(&i2v) - 0.20).abs() < 1e-9);

        let t2v = GenerationRequest::TextToVideo {
            params: VideoGenerationParams::new("clip"),
        };
        assert_eq!(provider.estimate_cost(&t2v), 0.0);
    }

    // ========================================================================
    // Poll Protocol Tests
    // ========================================================================

    #[test]
    fn test_poll_in_progress() {
        let job = parse_poll_response("j1", StatusCode::ACCEPTED, "").unwrap();
        assert_eq!(job.status, crate::poller::JobStatus::Pending);
    }

    #[test]
    fn test_poll_finished_with_video() {
        let job =
            parse_poll_response("j1", StatusCode::OK, r#"{"video":"aGVsbG8="}"#).unwrap();
        assert_eq!(job.status, crate::poller::JobStatus::Succeeded);
        assert_eq!(job.result_ref.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn test_poll_finished_without_video() {
        let err = parse_poll_response("j1", StatusCode::OK, r#"{"seed":42}"#).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));

        let err = parse_poll_response("j1", StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    #[test]
    fn test_poll_server_error_fails_job() {
        let job = parse_poll_response(
            "j1",
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"errors":["render crashed"]}"#,
        )
        .unwrap();
        assert_eq!(job.status, crate::poller::JobStatus::Failed);
        let error = job.error.unwrap();
        assert!(error.starts_with("HTTP 500"));
        assert!(error.contains("render crashed"));
    }

    #[test]
    fn test_submit_response_parsing() {
        let parsed: SubmitResponse = serde_json::from_str(r#"{"id":"vid-123"}"#).unwrap();
        assert_eq!(parsed.id, "vid-123");

        let parsed: SubmitResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.id.is_empty());
    }
}

//! Runway Provider
//!
//! Adapter for the Runway task API: text-to-video and image-to-video share
//! one submit/poll/download lifecycle, differing only in the request body.
//! Every call carries the API version header; conditioning frames travel
//! inline as data URIs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProviderSettings;
use crate::error::{ForgeError, ForgeResult};
use crate::poller::{download_to_file, AsyncJob, JobPoller};
use crate::provider::{MediaCapability, MediaProvider};
use crate::providers::{read_response, sanitize_job_id};
use crate::request::GenerationRequest;
use crate::video::VideoGenerationParams;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the Runway API
const DEFAULT_BASE_URL: &str = "https://api.dev.runwayml.com/v1";

/// Versioning header required on every request
const VERSION_HEADER: &str = "X-Runway-Version";
const API_VERSION: &str = "2024-09-13";

/// Default generation model
const DEFAULT_MODEL: &str = "gen4_turbo";

/// Output resolutions; image-to-video supports a slightly taller frame
const DEFAULT_T2V_RATIO: &str = "1280:720";
const DEFAULT_I2V_RATIO: &str = "1280:768";

/// Clip length submitted when the caller leaves duration unset
const DEFAULT_DURATION_SECS: f64 = 10.0;

/// Duration assumed when estimating an unset-duration request
const ESTIMATE_DEFAULT_DURATION_SECS: f64 = 4.0;

/// Estimate per second of output, USD
const COST_PER_SECOND: f64 = 0.05;

/// Motion guidance sent when animating an image without a prompt
const DEFAULT_I2V_PROMPT: &str = "Cinematic slow motion";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SubmitTaskRequest {
    #[serde(rename = "promptText")]
    prompt_text: String,
    #[serde(rename = "promptImage", skip_serializing_if = "Option::is_none")]
    prompt_image: Option<String>,
    model: String,
    duration: u32,
    ratio: String,
}

#[derive(Debug, Deserialize)]
struct SubmitTaskResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Vec<String>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ============================================================================
// RunwayProvider
// ============================================================================

/// Runway adapter
pub struct RunwayProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    poller: JobPoller,
}

impl std::fmt::Debug for RunwayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunwayProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl RunwayProvider {
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{}", self.base_url, task_id)
    }

    /// Submits a task, polls it to completion, downloads the output
    async fn run_task(
        &self,
        path: &str,
        request: &SubmitTaskRequest,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .header(VERSION_HEADER, API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(format!("Runway request failed: {}", e)))?;
        let body = read_response("Runway", resp).await?;

        let submit: SubmitTaskResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Invalid Runway response: {}", e))
        })?;
        if submit.id.is_empty() {
            return Err(ForgeError::MalformedProviderResponse(
                "Runway returned no task id".to_string(),
            ));
        }
        let task_id = submit.id;
        info!(task_id, "task submitted");

        let job = self
            .poller
            .poll(&task_id, |_attempt| {
                let client = self.client.clone();
                let url = self.task_url(&task_id);
                let key = self.api_key.clone();
                let id = task_id.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .bearer_auth(&key)
                        .header(VERSION_HEADER, API_VERSION)
                        .send()
                        .await
                        .map_err(|e| {
                            ForgeError::RequestFailed(format!("Runway poll failed: {}", e))
                        })?;
                    let body = read_response("Runway", resp).await?;
                    parse_task_status(&id, &body)
                }
            })
            .await?;

        let output_url = job.result_ref.ok_or_else(|| {
            ForgeError::MalformedProviderResponse(
                "Runway task succeeded without output".to_string(),
            )
        })?;

        let dest = workdir.join(format!("runway_{}.mp4", sanitize_job_id(&job.id)));
        download_to_file(&self.client, &output_url, &dest).await?;
        info!(task_id = %job.id, path = %dest.display(), "video generated");
        Ok(dest)
    }
}

/// Interprets one task status body
fn parse_task_status(task_id: &str, body: &str) -> ForgeResult<AsyncJob> {
    let parsed: TaskStatusResponse = serde_json::from_str(body).map_err(|e| {
        ForgeError::MalformedProviderResponse(format!("Invalid Runway task status: {}", e))
    })?;

    match parsed.status.as_str() {
        "SUCCEEDED" => match parsed.output.first() {
            Some(url) => Ok(AsyncJob::succeeded(task_id, url)),
            None => Err(ForgeError::MalformedProviderResponse(
                "Runway task succeeded without output".to_string(),
            )),
        },
        "FAILED" => {
            let detail = parsed
                .failure
                .or(parsed.error)
                .unwrap_or_else(|| body.chars().take(500).collect());
            Ok(AsyncJob::failed(task_id, detail))
        }
        "PENDING" | "RUNNING" | "THROTTLED" => Ok(AsyncJob::pending(task_id)),
        other => {
            warn!(task_id, status = other, "unknown task status, treating as pending");
            Ok(AsyncJob::pending(task_id))
        }
    }
}

/// Maps an aspect ratio onto the closest supported output resolution
fn runway_ratio(aspect_ratio: Option<&str>, fallback: &'static str) -> &'static str {
    match aspect_ratio {
        Some("16:9") => "1280:720",
        Some("9:16") => "720:1280",
        Some("1:1") => "960:960",
        Some("4:3") => "1104:832",
        Some("3:4") => "832:1104",
        _ => fallback,
    }
}

/// Encodes a conditioning frame as an inline data URI
fn image_data_uri(path: &Path, bytes: &[u8]) -> String {
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            "image/jpeg"
        }
        Some(ext) if ext.eq_ignore_ascii_case("webp") => "image/webp",
        _ => "image/png",
    };
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

#[async_trait]
impl MediaProvider for RunwayProvider {
    fn name(&self) -> &str {
        "runway"
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        vec![MediaCapability::TextToVideo, MediaCapability::ImageToVideo]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        match request {
            GenerationRequest::TextToVideo { params }
            | GenerationRequest::ImageToVideo { params, .. } => {
                params
                    .duration_seconds
                    .unwrap_or(ESTIMATE_DEFAULT_DURATION_SECS)
                    * COST_PER_SECOND
            }
            _ => 0.0,
        }
    }

    async fn text_to_video(
        &self,
        params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let request = SubmitTaskRequest {
            prompt_text: params.prompt.clone(),
            prompt_image: None,
            model: params.model.clone().unwrap_or_else(|| self.model.clone()),
            duration: params
                .duration_seconds
                .unwrap_or(DEFAULT_DURATION_SECS)
                .round() as u32,
            ratio: runway_ratio(params.aspect_ratio.as_deref(), DEFAULT_T2V_RATIO).to_string(),
        };
        self.run_task("/text_to_video", &request, workdir).await
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
            DEFAULT_I2V_PROMPT.to_string()
        } else {
            params.prompt.clone()
        };

        let request = SubmitTaskRequest {
            prompt_text: prompt,
            prompt_image: Some(image_data_uri(image, &bytes)),
            model: params.model.clone().unwrap_or_else(|| self.model.clone()),
            duration: params
                .duration_seconds
                .unwrap_or(DEFAULT_DURATION_SECS)
                .round() as u32,
            ratio: runway_ratio(params.aspect_ratio.as_deref(), DEFAULT_I2V_RATIO).to_string(),
        };
        self.run_task("/image_to_video", &request, workdir).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::JobStatus;

    #[test]
    fn test_name_and_capabilities() {
        let provider = RunwayProvider::new("rw-test").unwrap();
        assert_eq!(provider.name(), "runway");
        assert!(provider.supports(MediaCapability::TextToVideo));
        assert!(provider.supports(MediaCapability::ImageToVideo));
        assert!(!provider.supports(MediaCapability::ScenePlanning));
    }

    #[test]
    fn test_availability_requires_key() {
        assert!(RunwayProvider::new("rw-test").unwrap().is_available());
        assert!(!RunwayProvider::new("").unwrap().is_available());
    }

    #[test]
    fn test_url_building() {
        let provider = RunwayProvider::new("rw-test").unwrap();
        assert_eq!(
            provider.endpoint("/text_to_video"),
            "https://api.dev.runwayml.com/v1/text_to_video"
        );
        assert_eq!(
            provider.task_url("t-9"),
            "https://api.dev.runwayml.com/v1/tasks/t-9"
        );

        let custom = RunwayProvider::new("rw-test")
            .unwrap()
            .with_base_url("http://localhost:4010/v1");
        assert_eq!(custom.task_url("t-9"), "http://localhost:4010/v1/tasks/t-9");
    }

    #[test]
    fn test_ratio_mapping() {
        assert_eq!(runway_ratio(Some("16:9"), DEFAULT_T2V_RATIO), "1280:720");
        assert_eq!(runway_ratio(Some("9:16"), DEFAULT_T2V_RATIO), "720:1280");
        assert_eq!(runway_ratio(Some("1:1"), DEFAULT_T2V_RATIO), "960:960");
        assert_eq!(runway_ratio(None, DEFAULT_T2V_RATIO), "1280:720");
        assert_eq!(runway_ratio(None, DEFAULT_I2V_RATIO), "1280:768");
    }

    #[test]
    fn test_image_data_uri_mime_types() {
        let uri = image_data_uri(Path::new("/tmp/frame.jpg"), b"abc");
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let uri = image_data_uri(Path::new("/tmp/frame.JPEG"), b"abc");
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let uri = image_data_uri(Path::new("/tmp/frame.webp"), b"abc");
        assert!(uri.starts_with("data:image/webp;base64,"));

        let uri = image_data_uri(Path::new("/tmp/frame.png"), b"abc");
        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(uri.ends_with(&BASE64.encode(b"abc")));
    }

    #[test]
    fn test_estimate_cost_scales_with_duration() {
        let provider = RunwayProvider::new("rw-test").unwrap();

        let unset = GenerationRequest::TextToVideo {
            params: VideoGenerationParams::new("clip"),
        };
        assert!((provider.estimate_cost(&unset) - 0.20).abs() < 1e-9);

        let ten_seconds = GenerationRequest::ImageToVideo {
            image: PathBuf::from("/tmp/frame.png"),
            params: VideoGenerationParams::default().with_duration(10.0),
        };
        assert!((provider.estimate_cost(&ten_seconds) - 0.50).abs() < 1e-9);

        let planning = GenerationRequest::ScenePlanning {
            script: "story".to_string(),
            params: crate::planner::ScenePlanParams::default(),
        };
        assert_eq!(provider.estimate_cost(&planning), 0.0);
    }

    // ========================================================================
    // Task Status Tests
    // ========================================================================

    #[test]
    fn test_task_status_succeeded() {
        let body = r#"{"status":"SUCCEEDED","output":["https://cdn.runway.com/out.mp4"]}"#;
        let job = parse_task_status("t1", body).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(
            job.result_ref.as_deref(),
            Some("https://cdn.runway.com/out.mp4")
        );
    }

    #[test]
    fn test_task_status_succeeded_without_output() {
        let err = parse_task_status("t1", r#"{"status":"SUCCEEDED","output":[]}"#).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    #[test]
    fn test_task_status_failed_prefers_failure_field() {
        let body = r#"{"status":"FAILED","failure":"content moderated","error":"generic"}"#;
        let job = parse_task_status("t1", body).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("content moderated"));
    }

    #[test]
    fn test_task_status_failed_without_detail_keeps_body() {
        let body = r#"{"status":"FAILED"}"#;
        let job = parse_task_status("t1", body).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(body));
    }

    #[test]
    fn test_task_status_in_flight_variants() {
        for status in ["PENDING", "RUNNING", "THROTTLED", "QUEUED_SOMEWHERE"] {
            let body = format!(r#"{{"status":"{}"}}"#, status);
            let job = parse_task_status("t1", &body).unwrap();
            assert_eq!(job.status, JobStatus::Pending, "status {}", status);
        }
    }

    #[test]
    fn test_task_status_rejects_garbage() {
        let err = parse_task_status("t1", "<html>502</html>").unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    // ========================================================================
    // DTO Tests
    // ========================================================================

    #[test]
    fn test_submit_request_serialization() {
        let request = SubmitTaskRequest {
            prompt_text: "A chase scene".to_string(),
            prompt_image: None,
            model: "gen4_turbo".to_string(),
            duration: 10,
            ratio: "1280:720".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains("\"promptText\":\"A chase scene\""));
        assert!(json.contains("\"duration\":10"));
        assert!(!json.contains("promptImage"));

        let with_image = SubmitTaskRequest {
            prompt_image: Some("data:image/png;base64,QUJD".to_string()),
            ..request
        };
        let json = serde_json::to_string(&with_image).unwrap();
        assert!(json.contains("\"promptImage\":\"data:image/png;base64,QUJD\""));
    }
}

//! Provider Adapters
//!
//! One adapter per external service, each an isolated result-resolution
//! unit: its own serde DTOs, status parsing, and pricing. Shared here is
//! only what every adapter needs, error-body parsing and filename
//! sanitizing.

pub mod gemini;
pub mod openai;
pub mod runway;
pub mod stability;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use runway::RunwayProvider;
pub use stability::StabilityProvider;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ForgeError, ForgeResult};

/// Maximum length for job-id-derived output filenames
const MAX_JOB_ID_FILENAME_LEN: usize = 64;

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Turns a non-success HTTP response into a request error
///
/// Prefers the structured `{"error": {"message", "code"}}` shape most
/// providers share; falls back to the truncated raw body.
pub(crate) fn parse_api_error(provider: &str, status: StatusCode, body: &str) -> ForgeError {
    if let Ok(err_resp) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(detail) = err_resp.error {
            return ForgeError::RequestFailed(format!(
                "{} API error ({}): {} (code: {})",
                provider,
                status,
                detail.message.unwrap_or_default(),
                detail.code.unwrap_or_default(),
            ));
        }
    }

    let truncated: String = body.chars().take(500).collect();
    ForgeError::RequestFailed(format!("{} API error ({}): {}", provider, status, truncated))
}

/// Reads a response body, mapping non-success statuses to request errors
pub(crate) async fn read_response(provider: &str, resp: reqwest::Response) -> ForgeResult<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| {
        ForgeError::RequestFailed(format!("Failed to read {} response: {}", provider, e))
    })?;

    if !status.is_success() {
        return Err(parse_api_error(provider, status, &body));
    }

    Ok(body)
}

/// Sanitizes a provider job id for use as a filename segment
pub(crate) fn sanitize_job_id(job_id: &str) -> String {
    let sanitized: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_JOB_ID_FILENAME_LEN)
        .collect();

    if sanitized.is_empty() {
        "artifact".to_string()
    } else {
        sanitized
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_error_structured() {
        let body = r#"{"error":{"message":"Rate limit exceeded","code":"rate_limit"}}"#;
        let err = parse_api_error("OpenAI", StatusCode::TOO_MANY_REQUESTS, body);
        match err {
            ForgeError::RequestFailed(msg) => {
                assert!(msg.contains("OpenAI"));
                assert!(msg.contains("Rate limit exceeded"));
                assert!(msg.contains("rate_limit"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_api_error_unstructured() {
        let err = parse_api_error(
            "Runway",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
        );
        match err {
            ForgeError::RequestFailed(msg) => {
                assert!(msg.contains("Runway"));
                assert!(msg.contains("Internal Server Error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_api_error_truncates_long_body() {
        let body = "x".repeat(2000);
        let err = parse_api_error("Stability", StatusCode::BAD_GATEWAY, &body);
        match err {
            ForgeError::RequestFailed(msg) => assert!(msg.len() < 600),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sanitize_job_id() {
        assert_eq!(sanitize_job_id("task-123_abc"), "task-123_abc");
        assert_eq!(sanitize_job_id("../../job:abc?*"), "______job_abc__");
        assert_eq!(sanitize_job_id(""), "artifact");

        let long = "a".repeat(100);
        assert_eq!(sanitize_job_id(&long).len(), 64);
    }
}

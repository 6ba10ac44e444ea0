//! Job Polling
//!
//! Bounded polling loop for provider jobs that complete asynchronously,
//! plus the helpers that resolve a finished job's payload (HTTP download
//! under a size cap, base64 decode) into a local file.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ForgeError, ForgeResult};

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default maximum number of status polls (with the default interval,
/// roughly four minutes per job)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// Hard cap on downloaded artifact size (500 MB)
const MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Status of an asynchronous provider job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Still running on the provider side
    Pending,
    /// Finished with a retrievable result
    Succeeded,
    /// Finished without a result
    Failed,
}

impl JobStatus {
    /// Returns true when no further polling is useful
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// One observation of a provider-side job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncJob {
    /// Provider-assigned job id
    pub id: String,
    /// Last observed status
    pub status: JobStatus,
    /// Where the result lives once succeeded (URL, inline payload, or
    /// local path)
    pub result_ref: Option<String>,
    /// Provider's raw error body when failed
    pub error: Option<String>,
}

impl AsyncJob {
    /// A job still in flight
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            result_ref: None,
            error: None,
        }
    }

    /// A finished job with its result reference
    pub fn succeeded(id: impl Into<String>, result_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Succeeded,
            result_ref: Some(result_ref.into()),
            error: None,
        }
    }

    /// A failed job carrying the provider's error body
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Failed,
            result_ref: None,
            error: Some(error.into()),
        }
    }
}

/// Bounded polling loop
///
/// Sleeps before each status check, so a job is observed at most
/// `max_attempts` times, roughly `interval * max_attempts` apart end to end.
#[derive(Debug, Clone)]
pub struct JobPoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl JobPoller {
    /// Creates a poller with the default interval and attempt ceiling
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the delay between polls
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the attempt ceiling
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Polls `check` until the job reaches a terminal state
    ///
    /// `check` receives the 1-based attempt number. Success returns the
    /// succeeded job; a failed job becomes `ProviderJobFailed`; exhausting
    /// the attempt ceiling becomes `ProviderJobTimeout` after exactly
    /// `max_attempts` checks. Errors from `check` itself propagate
    /// immediately.
    pub async fn poll<F, Fut>(&self, job_id: &str, mut check: F) -> ForgeResult<AsyncJob>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = ForgeResult<AsyncJob>> + Send,
    {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            let job = check(attempt).await?;
            match job.status {
                JobStatus::Succeeded => {
                    debug!(job_id, attempt, "job succeeded");
                    return Ok(job);
                }
                JobStatus::Failed => {
                    return Err(ForgeError::ProviderJobFailed {
                        job_id: job_id.to_string(),
                        body: job
                            .error
                            .unwrap_or_else(|| "no error detail provided".to_string()),
                    });
                }
                JobStatus::Pending => {
                    debug!(job_id, attempt, "job still pending");
                }
            }
        }

        Err(ForgeError::ProviderJobTimeout {
            job_id: job_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

// ============================================================================
// Result Resolution
// ============================================================================

/// Rejects result URLs that are not plain http(s)
pub fn validate_download_url(url: &str) -> ForgeResult<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(ForgeError::MalformedProviderResponse(format!(
            "Refusing to download from non-HTTP URL: {}",
            url
        )))
    }
}

/// Streams an HTTP artifact to a local file, returning the byte count
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> ForgeResult<u64> {
    validate_download_url(url)?;

    let mut resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ForgeError::RequestFailed(format!("Download request failed: {}", e)))?;

    if !resp.status().is_success() {
        return Err(ForgeError::RequestFailed(format!(
            "Download failed with HTTP {}",
            resp.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut total_bytes: u64 = 0;

    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ForgeError::RequestFailed(format!("Download stream interrupted: {}", e)))?
    {
        total_bytes = total_bytes.saturating_add(chunk.len() as u64);
        if total_bytes > MAX_DOWNLOAD_BYTES {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(ForgeError::RequestFailed(format!(
                "Artifact exceeds download size limit ({} bytes)",
                MAX_DOWNLOAD_BYTES
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    debug!(url, bytes = total_bytes, "artifact downloaded");
    Ok(total_bytes)
}

/// Decodes a base64 payload to a local file, returning the byte count
pub async fn decode_base64_to_file(data: &str, dest: &Path) -> ForgeResult<u64> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| ForgeError::MalformedProviderResponse(format!("Invalid base64 payload: {}", e)))?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(bytes.len() as u64)
}

// ============================================================================
// Tests
// ============================================================================

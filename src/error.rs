//! Error Types
//!
//! Error types used throughout the generation pipeline.

use thiserror::Error;

/// Pipeline error type
#[derive(Error, Debug)]
pub enum ForgeError {
    // ========================================================================
    // Capability & Registry
    // ========================================================================
    /// Provider does not support the requested operation
    #[error("Provider '{provider}' does not support {capability}")]
    UnsupportedCapability { provider: String, capability: String },

    /// Named resource (provider, role) is not registered
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Provider Responses & Jobs
    // ========================================================================
    /// Provider returned a payload that could not be parsed or validated
    #[error("Malformed provider response: {0}")]
    MalformedProviderResponse(String),

    /// Asynchronous provider job reported failure
    #[error("Provider job '{job_id}' failed: {body}")]
    ProviderJobFailed { job_id: String, body: String },

    /// Asynchronous provider job never reached a terminal state
    #[error("Provider job '{job_id}' timed out after {attempts} poll attempts")]
    ProviderJobTimeout { job_id: String, attempts: u32 },

    /// HTTP transport failure
    #[error("Request failed: {0}")]
    RequestFailed(String),

    // ========================================================================
    // Budget
    // ========================================================================
    /// Budget authority rejected the estimated spend (or the check could not
    /// be completed, which is treated the same way)
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    // ========================================================================
    // Pipeline
    // ========================================================================
    /// One scene of a composed run failed; the whole run is aborted
    #[error("Scene {index} failed during {stage}: {source}")]
    SceneGenerationFailed {
        index: usize,
        stage: String,
        source: Box<ForgeError>,
    },

    /// The external assembler reported an error or received no segments
    #[error("Assembly failed: {0}")]
    AssemblyFailed(String),

    /// The whole pipeline run exceeded its time budget
    #[error("Pipeline timed out after {elapsed_secs}s")]
    PipelineTimeout { elapsed_secs: u64 },

    // ========================================================================
    // Validation
    // ========================================================================
    /// Invalid parameters or configuration
    #[error("Validation error: {0}")]
    ValidationError(String),

    // ========================================================================
    // IO & Serialization
    // ========================================================================
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================================================
    // Internal
    // ========================================================================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using ForgeError
pub type ForgeResult<T> = Result<T, ForgeError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForgeError::UnsupportedCapability {
            provider: "gemini".to_string(),
            capability: "image_to_video".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider 'gemini' does not support image_to_video"
        );

        let err = ForgeError::ProviderJobTimeout {
            job_id: "job-42".to_string(),
            attempts: 120,
        };
        assert_eq!(
            err.to_string(),
            "Provider job 'job-42' timed out after 120 poll attempts"
        );
    }

    #[test]
    fn test_scene_failure_carries_source() {
        let inner = ForgeError::RequestFailed("connection reset".to_string());
        let err = ForgeError::SceneGenerationFailed {
            index: 1,
            stage: "animation".to_string(),
            source: Box::new(inner),
        };

        let msg = err.to_string();
        assert!(msg.contains("Scene 1"));
        assert!(msg.contains("animation"));
        assert!(msg.contains("connection reset"));

        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: ForgeError = io.into();
        assert!(matches!(err, ForgeError::IoError(_)));
    }
}

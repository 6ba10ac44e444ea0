//! Configuration
//!
//! Configuration surface for the pipeline. The host application loads these
//! structs (from file, env, or code); they stay immutable for the lifetime
//! of a run. Loading itself is the host's concern.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ForgeConfig {
    /// Per-provider settings, keyed by provider name
    pub providers: HashMap<String, ProviderSettings>,
    /// Which provider fills each pipeline role
    pub roles: PipelineRoles,
    /// Cost guard settings
    pub guard: GuardConfig,
    /// Pipeline limits
    pub limits: PipelineLimits,
    /// Per-stage cost constants used by the composed estimate
    pub costs: PipelineCosts,
    /// Assembler settings
    pub assembler: AssemblerConfig,
    /// Base directory for run scratch space; system temp dir when unset
    pub workdir: Option<PathBuf>,
}

impl ForgeConfig {
    /// Adds settings for a named provider
    pub fn with_provider(mut self, name: impl Into<String>, settings: ProviderSettings) -> Self {
        self.providers.insert(name.into(), settings);
        self
    }

    /// Sets the scratch base directory
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Returns settings for a provider, if configured
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }

    /// Validates the whole configuration
    pub fn validate(&self) -> Result<(), String> {
        self.limits.validate()?;
        self.costs.validate()?;
        self.guard.validate()?;
        self.assembler.validate()?;

        for (name, settings) in &self.providers {
            settings
                .validate()
                .map_err(|e| format!("provider '{}': {}", name, e))?;
        }

        Ok(())
    }
}

/// Connection settings for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API key
    pub api_key: Option<String>,
    /// Base URL override
    pub base_url: Option<String>,
    /// Model override
    pub model: Option<String>,
    /// Per-request HTTP timeout in seconds
    pub timeout_secs: u64,
    /// Delay between status polls for asynchronous jobs
    pub poll_interval_secs: u64,
    /// Maximum number of status polls before giving up
    pub max_poll_attempts: u32,
    /// Additional provider-specific settings
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: 60,
            poll_interval_secs: 2,
            max_poll_attempts: 120,
            extra: HashMap::new(),
        }
    }
}

impl ProviderSettings {
    /// Creates settings with an API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the HTTP timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets an extra setting
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Gets an extra setting
    pub fn get_setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be positive".to_string());
        }
        if self.max_poll_attempts == 0 {
            return Err("max_poll_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Provider names filling each pipeline role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRoles {
    /// Scene planning provider
    pub planning: String,
    /// Still image provider
    pub image: String,
    /// Image-to-video animation provider
    pub animation: String,
    /// Voice synthesis provider
    pub voice: String,
}

impl Default for PipelineRoles {
    fn default() -> Self {
        Self {
            planning: "openai".to_string(),
            image: "openai".to_string(),
            animation: "stability".to_string(),
            voice: "openai".to_string(),
        }
    }
}

/// Cost guard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Whether provider calls are budget-checked
    pub enabled: bool,
    /// Spend ceiling for one generated video, in USD
    pub cost_limit_per_video: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cost_limit_per_video: 10.00,
        }
    }
}

impl GuardConfig {
    fn validate(&self) -> Result<(), String> {
        if self.cost_limit_per_video < 0.0 || !self.cost_limit_per_video.is_finite() {
            return Err("cost_limit_per_video must be a non-negative number".to_string());
        }
        Ok(())
    }
}

/// Pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineLimits {
    /// Planned seconds of video per scene
    pub seconds_per_scene: f64,
    /// Requested duration when the caller does not specify one
    pub default_duration: f64,
    /// Hard cap on requested duration, in seconds
    pub max_duration: f64,
    /// Number of scenes generated concurrently (1 = sequential)
    pub concurrency: usize,
    /// Wall-clock budget for one whole run, in seconds
    pub run_timeout_secs: u64,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            seconds_per_scene: 5.0,
            default_duration: 15.0,
            max_duration: 60.0,
            concurrency: 2,
            run_timeout_secs: 1200,
        }
    }
}

impl PipelineLimits {
    fn validate(&self) -> Result<(), String> {
        if self.seconds_per_scene <= 0.0 || !self.seconds_per_scene.is_finite() {
            return Err("seconds_per_scene must be positive".to_string());
        }
        if self.default_duration <= 0.0 || !self.default_duration.is_finite() {
            return Err("default_duration must be positive".to_string());
        }
        if self.max_duration <= 0.0 || !self.max_duration.is_finite() {
            return Err("max_duration must be positive".to_string());
        }
        if self.default_duration > self.max_duration {
            return Err("default_duration cannot exceed max_duration".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        if self.run_timeout_secs == 0 {
            return Err("run_timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}

/// Per-stage cost constants for the composed estimate, in USD
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineCosts {
    /// Scene planning cost per run
    pub planning: f64,
    /// Still image cost per scene
    pub image: f64,
    /// Animation cost per scene
    pub animation: f64,
    /// Voice synthesis cost per scene
    pub voice: f64,
}

impl Default for PipelineCosts {
    fn default() -> Self {
        Self {
            planning: 0.03,
            image: 0.04,
            animation: 0.20,
            voice: 0.015,
        }
    }
}

impl PipelineCosts {
    /// Cost of one fully generated scene
    pub fn per_scene(&self) -> f64 {
        self.image + self.animation + self.voice
    }

    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("planning", self.planning),
            ("image", self.image),
            ("animation", self.animation),
            ("voice", self.voice),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(format!("cost '{}' must be a non-negative number", name));
            }
        }
        Ok(())
    }
}

/// Assembler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
    /// Timeout for one ffmpeg invocation, in seconds
    pub timeout_secs: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            timeout_secs: 3600,
        }
    }
}

impl AssemblerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err("ffmpeg_path cannot be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("assembler timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! ReelForge
//!
//! Multi-provider generative media pipeline: a text script or a still image
//! goes in, a finished video comes out. Scene planning, per-scene image
//! synthesis, image-to-video animation, and narration run against pluggable
//! provider APIs under a per-request budget; final assembly happens locally
//! with ffmpeg.

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod image;
pub mod pipeline;
pub mod planner;
pub mod poller;
pub mod provider;
pub mod providers;
pub mod request;
pub mod scene;
pub mod speech;
pub mod video;

// Re-export main types
pub use assembler::{FfmpegAssembler, GeneratedSegment, MediaAssembler};
pub use config::{
    AssemblerConfig, ForgeConfig, GuardConfig, PipelineCosts, PipelineLimits, PipelineRoles,
    ProviderSettings,
};
pub use engine::MediaEngine;
pub use error::{ForgeError, ForgeResult};
pub use guard::{BudgetAuthority, CostEstimate, CostGuard, FixedBudgetAuthority, UsageRecord};
pub use image::ImageGenerationParams;
pub use pipeline::{ComposedPipeline, FINAL_OUTPUT_NAME};
pub use planner::{ScenePlanParams, ScenePlanner};
pub use poller::{AsyncJob, JobPoller, JobStatus};
pub use provider::{MediaCapability, MediaProvider};
pub use providers::{GeminiProvider, OpenAiProvider, RunwayProvider, StabilityProvider};
pub use request::{GenerationRequest, GenerationResult};
pub use scene::Scene;
pub use speech::{AudioFormat, SpeechParams};
pub use video::VideoGenerationParams;

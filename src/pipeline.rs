//! Composed Pipeline
//!
//! Text-to-video built from single-purpose providers: a planning provider
//! breaks the script into scenes, then each scene is rendered (still image,
//! animation, narration) with bounded concurrency and the segments are
//! concatenated locally. The pipeline is itself a `MediaProvider`, so it
//! registers, estimates, and budget-wraps like any other provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::assembler::{GeneratedSegment, MediaAssembler};
use crate::config::{PipelineCosts, PipelineLimits};
use crate::error::{ForgeError, ForgeResult};
use crate::image::ImageGenerationParams;
use crate::planner::{ScenePlanParams, ScenePlanner};
use crate::provider::{MediaCapability, MediaProvider};
use crate::request::GenerationRequest;
use crate::scene::Scene;
use crate::speech::SpeechParams;
use crate::video::VideoGenerationParams;

/// Name of the assembled file, inside the scratch directory and then the
/// caller's workdir
pub const FINAL_OUTPUT_NAME: &str = "final_merged_output.mp4";

/// Estimate for requests the composed formula does not model
const FALLBACK_ESTIMATE: f64 = 0.10;

/// Scene-based text-to-video over single-purpose providers
pub struct ComposedPipeline {
    planning: Arc<dyn MediaProvider>,
    image: Arc<dyn MediaProvider>,
    animation: Arc<dyn MediaProvider>,
    voice: Arc<dyn MediaProvider>,
    assembler: Arc<dyn MediaAssembler>,
    costs: PipelineCosts,
    limits: PipelineLimits,
}

impl std::fmt::Debug for ComposedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedPipeline")
            .field("costs", &self.costs)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl ComposedPipeline {
    /// Creates a pipeline over one provider per role and an assembler
    pub fn new(
        planning: Arc<dyn MediaProvider>,
        image: Arc<dyn MediaProvider>,
        animation: Arc<dyn MediaProvider>,
        voice: Arc<dyn MediaProvider>,
        assembler: Arc<dyn MediaAssembler>,
    ) -> Self {
        Self {
            planning,
            image,
            animation,
            voice,
            assembler,
            costs: PipelineCosts::default(),
            limits: PipelineLimits::default(),
        }
    }

    /// Sets the cost constants used by the estimate
    pub fn with_costs(mut self, costs: PipelineCosts) -> Self {
        self.costs = costs;
        self
    }

    /// Sets the pipeline limits
    pub fn with_limits(mut self, limits: PipelineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the segment assembler
    pub fn with_assembler(mut self, assembler: Arc<dyn MediaAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Requested duration clamped to the configured maximum
    fn target_duration(&self, params: &VideoGenerationParams) -> f64 {
        params
            .duration_seconds
            .unwrap_or(self.limits.default_duration)
            .min(self.limits.max_duration)
    }

    /// One full run inside a fresh scratch directory
    ///
    /// The scratch directory is removed on success and retained on failure
    /// so partial artifacts can be inspected.
    async fn run(&self, params: &VideoGenerationParams, workdir: &Path) -> ForgeResult<PathBuf> {
        let scratch = workdir.join(format!("run_{}", Ulid::new()));
        tokio::fs::create_dir_all(&scratch).await?;
        debug!(scratch = %scratch.display(), "created run scratch directory");

        match self.run_in_scratch(params, workdir, &scratch).await {
            Ok(output) => {
                if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                    warn!(
                        scratch = %scratch.display(),
                        error = %e,
                        "failed to remove scratch directory"
                    );
                }
                Ok(output)
            }
            Err(e) => {
                warn!(
                    scratch = %scratch.display(),
                    "run failed, scratch directory retained"
                );
                Err(e)
            }
        }
    }

    async fn run_in_scratch(
        &self,
        params: &VideoGenerationParams,
        workdir: &Path,
        scratch: &Path,
    ) -> ForgeResult<PathBuf> {
        let target = self.target_duration(params);
        let max_scenes = (target / self.limits.seconds_per_scene).ceil() as usize;

        let plan_params = ScenePlanParams::new()
            .with_max_scenes(max_scenes)
            .with_target_duration(target);
        let planner = ScenePlanner::new(self.planning.clone());
        let scenes = planner.plan(&params.prompt, &plan_params).await?;

        let scene_count = scenes.len();
        info!(
            scenes = scene_count,
            target_duration = target,
            "generating scene segments"
        );

        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency));
        let mut join_set = JoinSet::new();
        for scene in scenes {
            let semaphore = semaphore.clone();
            let image = self.image.clone();
            let animation = self.animation.clone();
            let voice = self.voice.clone();
            let scratch = scratch.to_path_buf();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ForgeError::Internal("scene semaphore closed".to_string()))?;
                generate_segment(scene, image, animation, voice, scratch).await
            });
        }

        // First failure wins; remaining scene tasks are aborted
        let mut slots: Vec<Option<GeneratedSegment>> = vec![None; scene_count];
        while let Some(joined) = join_set.join_next().await {
            let result = joined
                .map_err(|e| ForgeError::Internal(format!("scene task panicked: {}", e)))?;
            match result {
                Ok((index, segment)) => slots[index] = Some(segment),
                Err(e) => {
                    join_set.abort_all();
                    return Err(e);
                }
            }
        }

        let segments: Vec<GeneratedSegment> = slots
            .into_iter()
            .map(|s| {
                s.ok_or_else(|| {
                    ForgeError::Internal("scene task finished without a segment".to_string())
                })
            })
            .collect::<ForgeResult<_>>()?;

        let merged = scratch.join(FINAL_OUTPUT_NAME);
        self.assembler.assemble(&segments, &merged).await?;

        let output = workdir.join(FINAL_OUTPUT_NAME);
        move_artifact(&merged, &output).await?;

        info!(
            output = %output.display(),
            scenes = scene_count,
            "composed run complete"
        );
        Ok(output)
    }
}

#[async_trait]
impl MediaProvider for ComposedPipeline {
    fn name(&self) -> &str {
        "composed"
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        vec![MediaCapability::TextToVideo, MediaCapability::ImageToVideo]
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        match request {
            GenerationRequest::TextToVideo { params } => {
                let target = self.target_duration(params);
                let scenes = (target / self.limits.seconds_per_scene).ceil();
                self.costs.planning + scenes * self.costs.per_scene()
            }
            _ => FALLBACK_ESTIMATE,
        }
    }

    async fn text_to_video(
        &self,
        params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        params.validate().map_err(ForgeError::ValidationError)?;

        let budget = Duration::from_secs(self.limits.run_timeout_secs);
        match tokio::time::timeout(budget, self.run(params, workdir)).await {
            Ok(result) => result,
            Err(_) => Err(ForgeError::PipelineTimeout {
                elapsed_secs: self.limits.run_timeout_secs,
            }),
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
        self.animation.image_to_video(image, params, workdir).await
    }
}

/// Renders one scene into a segment: still image, animation, narration
///
/// Artifacts land in the scratch directory under index-stable names so a
/// retained scratch dir reads in scene order.
async fn generate_segment(
    scene: Scene,
    image: Arc<dyn MediaProvider>,
    animation: Arc<dyn MediaProvider>,
    voice: Arc<dyn MediaProvider>,
    scratch: PathBuf,
) -> ForgeResult<(usize, GeneratedSegment)> {
    let index = scene.index;
    debug!(scene = index, "rendering scene");

    let image_params = ImageGenerationParams::new(&scene.visual_description);
    let raw_frame = image
        .generate_image(&image_params, &scratch)
        .await
        .map_err(|e| scene_failed(index, "image", e))?;
    let frame = scratch.join(format!("scene_{}.png", index));
    move_artifact(&raw_frame, &frame)
        .await
        .map_err(|e| scene_failed(index, "image", e))?;

    let clip_params = VideoGenerationParams::new(&scene.visual_description)
        .with_duration(scene.duration_seconds);
    let raw_clip = animation
        .image_to_video(&frame, &clip_params, &scratch)
        .await
        .map_err(|e| scene_failed(index, "animation", e))?;
    let clip = scratch.join(format!("scene_{}.mp4", index));
    move_artifact(&raw_clip, &clip)
        .await
        .map_err(|e| scene_failed(index, "animation", e))?;

    let mut segment = GeneratedSegment::new(&clip).with_duration(scene.duration_seconds);

    if scene.has_voiceover() {
        let speech_params = SpeechParams::default();
        let raw_narration = voice
            .generate_voice(&scene.voiceover_text, &speech_params, &scratch)
            .await
            .map_err(|e| scene_failed(index, "voice", e))?;
        let narration = scratch.join(format!(
            "voice_{}.{}",
            index,
            speech_params.format.extension()
        ));
        move_artifact(&raw_narration, &narration)
            .await
            .map_err(|e| scene_failed(index, "voice", e))?;
        segment = segment.with_audio(narration);
    }

    Ok((index, segment))
}

fn scene_failed(index: usize, stage: &str, source: ForgeError) -> ForgeError {
    ForgeError::SceneGenerationFailed {
        index,
        stage: stage.to_string(),
        source: Box::new(source),
    }
}

/// Moves a provider artifact into its index-stable slot; falls back to
/// copy-and-remove for cross-device moves
async fn move_artifact(from: &Path, to: &Path) -> ForgeResult<()> {
    if from == to {
        return Ok(());
    }
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

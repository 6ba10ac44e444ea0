//! Media Providers
//!
//! The uniform contract every generation provider implements. Providers
//! declare capabilities up front; operations they do not support fail fast
//! through the default method bodies, before any network traffic.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{ForgeError, ForgeResult};
use crate::image::ImageGenerationParams;
use crate::planner::ScenePlanParams;
use crate::request::GenerationRequest;
use crate::scene::Scene;
use crate::speech::SpeechParams;
use crate::video::VideoGenerationParams;

/// Capabilities a provider can offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCapability {
    /// Full script to finished video
    TextToVideo,
    /// Animate a still image into a clip
    ImageToVideo,
    /// Still-image synthesis
    TextToImage,
    /// Script to ordered scene list
    ScenePlanning,
    /// Narration audio synthesis
    VoiceSynthesis,
}

impl MediaCapability {
    /// Returns all capabilities
    pub fn all() -> Vec<MediaCapability> {
        vec![
            MediaCapability::TextToVideo,
            MediaCapability::ImageToVideo,
            MediaCapability::TextToImage,
            MediaCapability::ScenePlanning,
            MediaCapability::VoiceSynthesis,
        ]
    }
}

impl std::fmt::Display for MediaCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaCapability::TextToVideo => "text_to_video",
            MediaCapability::ImageToVideo => "image_to_video",
            MediaCapability::TextToImage => "text_to_image",
            MediaCapability::ScenePlanning => "scene_planning",
            MediaCapability::VoiceSynthesis => "voice_synthesis",
        };
        write!(f, "{}", name)
    }
}

/// Builds the fail-fast error for an unsupported operation
pub(crate) fn unsupported(provider: &str, capability: MediaCapability) -> ForgeError {
    ForgeError::UnsupportedCapability {
        provider: provider.to_string(),
        capability: capability.to_string(),
    }
}

/// Contract for generation providers
///
/// Artifact-producing operations take a `workdir` and return the local path
/// they wrote into it; asynchronous providers resolve their jobs internally
/// before returning.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Provider name (unique within an engine)
    fn name(&self) -> &str;

    /// Capabilities this provider offers
    fn capabilities(&self) -> Vec<MediaCapability>;

    /// Checks if a capability is supported
    fn supports(&self, capability: MediaCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Checks if the provider is currently usable (configured, reachable)
    fn is_available(&self) -> bool {
        true
    }

    /// Marker consulted by `CostGuard::wrap` so a provider is never
    /// budget-checked twice
    fn is_cost_guarded(&self) -> bool {
        false
    }

    /// Estimated cost of a request in USD; pure, no network
    fn estimate_cost(&self, request: &GenerationRequest) -> f64;

    /// Generates a video from a text prompt
    async fn text_to_video(
        &self,
        _params: &VideoGenerationParams,
        _workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        Err(unsupported(self.name(), MediaCapability::TextToVideo))
    }

    /// Animates a still image into a video clip
    async fn image_to_video(
        &self,
        _image: &Path,
        _params: &VideoGenerationParams,
        _workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        Err(unsupported(self.name(), MediaCapability::ImageToVideo))
    }

    /// Generates a still image
    async fn generate_image(
        &self,
        _params: &ImageGenerationParams,
        _workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        Err(unsupported(self.name(), MediaCapability::TextToImage))
    }

    /// Plans a script into an ordered scene list
    async fn generate_scenes(
        &self,
        _script: &str,
        _params: &ScenePlanParams,
    ) -> ForgeResult<Vec<Scene>> {
        Err(unsupported(self.name(), MediaCapability::ScenePlanning))
    }

    /// Synthesizes narration audio
    async fn generate_voice(
        &self,
        _text: &str,
        _params: &SpeechParams,
        _workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        Err(unsupported(self.name(), MediaCapability::VoiceSynthesis))
    }
}

impl std::fmt::Debug for dyn MediaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaProvider")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Mock Provider
// ============================================================================

/// Mock provider for testing
///
/// Records every invocation, writes placeholder artifacts into the given
/// workdir, and can be forced to fail a single operation.
pub struct MockMediaProvider {
    name: String,
    available: bool,
    capabilities: Vec<MediaCapability>,
    scenes: Vec<Scene>,
    cost: f64,
    fail_on: Option<MediaCapability>,
    calls: Mutex<Vec<MediaCapability>>,
}

impl MockMediaProvider {
    /// Creates a mock provider supporting every capability
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
            capabilities: MediaCapability::all(),
            scenes: vec![
                Scene::new(0, "A quiet street at dawn")
                    .with_voiceover("The day begins.")
                    .with_duration(4.0),
                Scene::new(1, "Traffic builds as the sun rises")
                    .with_voiceover("Slowly, the city wakes.")
                    .with_duration(4.0),
            ],
            cost: 0.05,
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets availability
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Sets the capability list
    pub fn with_capabilities(mut self, capabilities: Vec<MediaCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the canned scene plan
    pub fn with_scenes(mut self, scenes: Vec<Scene>) -> Self {
        self.scenes = scenes;
        self
    }

    /// Sets the flat cost estimate
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Forces the operation backing `capability` to fail
    pub fn with_failure_on(mut self, capability: MediaCapability) -> Self {
        self.fail_on = Some(capability);
        self
    }

    /// Returns every recorded invocation in order
    pub fn calls(&self) -> Vec<MediaCapability> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns how many times an operation was invoked
    pub fn call_count(&self, capability: MediaCapability) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == capability)
            .count()
    }

    fn record(&self, capability: MediaCapability) -> ForgeResult<()> {
        self.calls.lock().unwrap().push(capability);
        if self.fail_on == Some(capability) {
            return Err(ForgeError::RequestFailed(format!(
                "mock failure on {}",
                capability
            )));
        }
        Ok(())
    }

    async fn write_artifact(&self, workdir: &Path, ext: &str) -> ForgeResult<PathBuf> {
        let path = workdir.join(format!("mock_{}_{}.{}", self.name, Ulid::new(), ext));
        tokio::fs::write(&path, b"mock artifact").await?;
        Ok(path)
    }
}

#[async_trait]
impl MediaProvider for MockMediaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        self.capabilities.clone()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn estimate_cost(&self, _request: &GenerationRequest) -> f64 {
        self.cost
    }

    async fn text_to_video(
        &self,
        _params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        self.record(MediaCapability::TextToVideo)?;
        self.write_artifact(workdir, "mp4").await
    }

    async fn image_to_video(
        &self,
        image: &Path,
        _params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        self.record(MediaCapability::ImageToVideo)?;
        if !image.exists() {
            return Err(ForgeError::ValidationError(format!(
                "mock input image missing: {}",
                image.display()
            )));
        }
        self.write_artifact(workdir, "mp4").await
    }

    async fn generate_image(
        &self,
        _params: &ImageGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        self.record(MediaCapability::TextToImage)?;
        self.write_artifact(workdir, "png").await
    }

    async fn generate_scenes(
        &self,
        _script: &str,
        _params: &ScenePlanParams,
    ) -> ForgeResult<Vec<Scene>> {
        self.record(MediaCapability::ScenePlanning)?;
        Ok(self.scenes.clone())
    }

    async fn generate_voice(
        &self,
        _text: &str,
        params: &SpeechParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        self.record(MediaCapability::VoiceSynthesis)?;
        self.write_artifact(workdir, params.format.extension()).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // MediaCapability Tests
    // ========================================================================

    #[test]
    fn test_capability_display() {
        assert_eq!(MediaCapability::TextToVideo.to_string(), "text_to_video");
        assert_eq!(
            MediaCapability::ScenePlanning.to_string(),
            "scene_planning"
        );
    }

    #[test]
    fn test_capability_serialization() {
        assert_eq!(
            serde_json::to_string(&MediaCapability::ImageToVideo).unwrap(),
            "\"image_to_video\""
        );
        assert_eq!(
            serde_json::from_str::<MediaCapability>("\"voice_synthesis\"").unwrap(),
            MediaCapability::VoiceSynthesis
        );
    }

    #[test]
    fn test_capability_all() {
        let all = MediaCapability::all();
        assert_eq!(all.len(), 5);
        assert!(all.contains(&MediaCapability::TextToImage));
    }

    // ========================================================================
    // Trait Default Tests
    // ========================================================================

    struct PlanOnlyProvider;

    #[async_trait]
    impl MediaProvider for PlanOnlyProvider {
        fn name(&self) -> &str {
            "plan-only"
        }

        fn capabilities(&self) -> Vec<MediaCapability> {
            vec![MediaCapability::ScenePlanning]
        }

        fn estimate_cost(&self, _request: &GenerationRequest) -> f64 {
            0.01
        }
    }

    #[test]
    fn test_supports_uses_capability_list() {
        let provider = PlanOnlyProvider;
        assert!(provider.supports(MediaCapability::ScenePlanning));
        assert!(!provider.supports(MediaCapability::TextToVideo));
        assert!(provider.is_available());
        assert!(!provider.is_cost_guarded());
    }

    #[tokio::test]
    async fn test_default_body_fails_fast() {
        let provider = PlanOnlyProvider;
        let workdir = std::env::temp_dir();

        let err = provider
            .text_to_video(&VideoGenerationParams::new("test"), &workdir)
            .await
            .unwrap_err();

        match err {
            ForgeError::UnsupportedCapability {
                provider,
                capability,
            } => {
                assert_eq!(provider, "plan-only");
                assert_eq!(capability, "text_to_video");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ========================================================================
    // MockMediaProvider Tests
    // ========================================================================

    #[tokio::test]
    async fn test_mock_records_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockMediaProvider::new("mock");

        let scenes = mock
            .generate_scenes("a script", &ScenePlanParams::default())
            .await
            .unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].index, 0);

        let image = mock
            .generate_image(&ImageGenerationParams::new("a door"), dir.path())
            .await
            .unwrap();
        assert!(image.exists());

        assert_eq!(mock.call_count(MediaCapability::ScenePlanning), 1);
        assert_eq!(mock.call_count(MediaCapability::TextToImage), 1);
        assert_eq!(mock.call_count(MediaCapability::TextToVideo), 0);
        assert_eq!(
            mock.calls(),
            vec![
                MediaCapability::ScenePlanning,
                MediaCapability::TextToImage
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_forced_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mock =
            MockMediaProvider::new("mock").with_failure_on(MediaCapability::VoiceSynthesis);

        let err = mock
            .generate_voice("hello", &SpeechParams::default(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::RequestFailed(_)));

        // The failed attempt is still recorded
        assert_eq!(mock.call_count(MediaCapability::VoiceSynthesis), 1);
    }

    #[tokio::test]
    async fn test_mock_image_to_video_checks_input() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockMediaProvider::new("mock");

        let err = mock
            .image_to_video(
                Path::new("/nonexistent/frame.png"),
                &VideoGenerationParams::default(),
                dir.path(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ValidationError(_)));

        let frame = dir.path().join("frame.png");
        std::fs::write(&frame, b"png").unwrap();
        let clip = mock
            .image_to_video(&frame, &VideoGenerationParams::default(), dir.path())
            .await
            .unwrap();
        assert!(clip.exists());
    }

    #[test]
    fn test_mock_builders() {
        let mock = MockMediaProvider::new("custom")
            .with_available(false)
            .with_capabilities(vec![MediaCapability::ImageToVideo])
            .with_cost(0.42);

        assert_eq!(mock.name(), "custom");
        assert!(!mock.is_available());
        assert!(mock.supports(MediaCapability::ImageToVideo));
        assert!(!mock.supports(MediaCapability::ScenePlanning));

        let request = GenerationRequest::ImageToVideo {
            image: PathBuf::from("/tmp/a.png"),
            params: VideoGenerationParams::default(),
        };
        assert!((mock.estimate_cost(&request) - 0.42).abs() < f64::EPSILON);
    }
}

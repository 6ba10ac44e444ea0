//! Scene Planning
//!
//! Turns a script into an ordered scene list through a planning-capable
//! provider, and hosts the shared response parser every planning adapter
//! uses. Planning models wrap their JSON in markdown fences often enough
//! that the parser strips them before parsing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ForgeError, ForgeResult};
use crate::provider::{unsupported, MediaCapability, MediaProvider};
use crate::scene::Scene;

/// System prompt shared by planning adapters
pub const DIRECTOR_SYSTEM_PROMPT: &str =
    "You are a film director who breaks scripts into scene lists. Respond with JSON only.";

/// Parameters for scene planning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenePlanParams {
    /// Upper bound on the number of scenes
    pub max_scenes: Option<usize>,
    /// Desired total duration in seconds
    pub target_duration_seconds: Option<f64>,
    /// Model override
    pub model: Option<String>,
}

impl ScenePlanParams {
    /// Creates default params
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scene cap
    pub fn with_max_scenes(mut self, max_scenes: usize) -> Self {
        self.max_scenes = Some(max_scenes);
        self
    }

    /// Sets the target duration
    pub fn with_target_duration(mut self, seconds: f64) -> Self {
        self.target_duration_seconds = Some(seconds);
        self
    }

    /// Sets the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Validates the parameters
    pub fn validate(&self) -> Result<(), String> {
        if let Some(0) = self.max_scenes {
            return Err("max_scenes must be at least 1".to_string());
        }
        if let Some(d) = self.target_duration_seconds {
            if !d.is_finite() || d <= 0.0 {
                return Err("target_duration_seconds must be positive".to_string());
            }
        }
        Ok(())
    }
}

/// Plans scripts into ordered scene lists
pub struct ScenePlanner {
    provider: Arc<dyn MediaProvider>,
}

impl ScenePlanner {
    /// Creates a planner over a planning-capable provider
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        Self { provider }
    }

    /// Plans a script into scenes ordered by index
    ///
    /// The capability check runs before any network call. Returned scenes
    /// are sorted by index and must be contiguous from 0; a plan that is
    /// empty, has gaps, or repeats an index is rejected rather than
    /// silently renumbered.
    pub async fn plan(&self, script: &str, params: &ScenePlanParams) -> ForgeResult<Vec<Scene>> {
        if script.trim().is_empty() {
            return Err(ForgeError::ValidationError(
                "Script cannot be empty".to_string(),
            ));
        }
        params.validate().map_err(ForgeError::ValidationError)?;

        if !self.provider.supports(MediaCapability::ScenePlanning) {
            return Err(unsupported(
                self.provider.name(),
                MediaCapability::ScenePlanning,
            ));
        }

        let scenes = self.provider.generate_scenes(script, params).await?;
        let scenes = normalize(scenes)?;

        info!(
            provider = self.provider.name(),
            scenes = scenes.len(),
            "scene plan ready"
        );
        Ok(scenes)
    }
}

/// Sorts by index and enforces contiguity from 0
fn normalize(mut scenes: Vec<Scene>) -> ForgeResult<Vec<Scene>> {
    if scenes.is_empty() {
        return Err(ForgeError::MalformedProviderResponse(
            "Planner returned no scenes".to_string(),
        ));
    }

    scenes.sort_by_key(|s| s.index);

    for (expected, scene) in scenes.iter().enumerate() {
        if scene.index != expected {
            return Err(ForgeError::MalformedProviderResponse(format!(
                "Scene indices must be contiguous from 0; found index {} at position {}",
                scene.index, expected
            )));
        }
    }

    Ok(scenes)
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parses a planning model's response into scenes
///
/// Accepts a bare JSON array or an object wrapping it under a `"scenes"`
/// key, with or without markdown code fences around the payload.
pub fn parse_scene_plan(raw: &str) -> ForgeResult<Vec<Scene>> {
    let json_str = if raw.contains("```json") {
        raw.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(raw)
    } else if raw.contains("```") {
        raw.split("```")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(raw)
    } else {
        raw
    };
    let json_str = json_str.trim();

    if let Ok(scenes) = serde_json::from_str::<Vec<Scene>>(json_str) {
        return Ok(scenes);
    }

    #[derive(Deserialize)]
    struct Wrapper {
        scenes: Vec<Scene>,
    }

    serde_json::from_str::<Wrapper>(json_str)
        .map(|w| w.scenes)
        .map_err(|e| {
            ForgeError::MalformedProviderResponse(format!("Failed to parse scene plan: {}", e))
        })
}

/// Builds the planning request sent as the user message
pub fn director_prompt(script: &str, params: &ScenePlanParams) -> String {
    let mut prompt = String::from("Break the script below into scenes for a generated video.\n");

    if let Some(max) = params.max_scenes {
        prompt.push_str(&format!("Use at most {} scenes.\n", max));
    }
    if let Some(duration) = params.target_duration_seconds {
        prompt.push_str(&format!(
            "The scenes should cover roughly {:.0} seconds in total.\n",
            duration
        ));
    }

    prompt.push_str(
        "\nRespond with a JSON object holding a \"scenes\" array. Each scene has:\n\
         - \"index\": position, starting at 0\n\
         - \"visual_description\": what the scene shows, phrased as an image generation prompt\n\
         - \"voiceover_text\": narration spoken over the scene (may be empty)\n\
         - \"duration_seconds\": scene length in seconds\n\
         \nScript:\n",
    );
    prompt.push_str(script);
    prompt
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockMediaProvider;

    // ========================================================================
    // Parsing Tests
    // ========================================================================

    const BARE_ARRAY: &str = r#"[
        {"index": 0, "visual_description": "A harbor", "voiceover_text": "Dawn.", "duration_seconds": 4.0},
        {"index": 1, "visual_description": "A market", "voiceover_text": "Noon.", "duration_seconds": 5.0}
    ]"#;

    #[test]
    fn test_parse_bare_array() {
        let scenes = parse_scene_plan(BARE_ARRAY).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].visual_description, "A harbor");
    }

    #[test]
    fn test_parse_wrapped_object() {
        let raw = format!(r#"{{"scenes": {}}}"#, BARE_ARRAY);
        let scenes = parse_scene_plan(&raw).unwrap();
        assert_eq!(scenes.len(), 2);
    }

    #[test]
    fn test_parse_fenced_equals_unfenced() {
        let fenced = format!("```json\n{}\n```", BARE_ARRAY);
        assert_eq!(
            parse_scene_plan(&fenced).unwrap(),
            parse_scene_plan(BARE_ARRAY).unwrap()
        );
    }

    #[test]
    fn test_parse_fence_without_language_tag() {
        let fenced = format!("```\n{}\n```", BARE_ARRAY);
        let scenes = parse_scene_plan(&fenced).unwrap();
        assert_eq!(scenes.len(), 2);
    }

    #[test]
    fn test_parse_fenced_with_chatter() {
        let raw = format!("Here is the plan you asked for:\n```json\n{}\n```\nEnjoy!", BARE_ARRAY);
        let scenes = parse_scene_plan(&raw).unwrap();
        assert_eq!(scenes.len(), 2);
    }

    #[test]
    fn test_parse_applies_duration_default() {
        let raw = r#"[{"index": 0, "visual_description": "A door"}]"#;
        let scenes = parse_scene_plan(raw).unwrap();
        assert!((scenes[0].duration_seconds - 4.0).abs() < f64::EPSILON);
        assert_eq!(scenes[0].voiceover_text, "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_scene_plan("the model forgot to answer in JSON").unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    // ========================================================================
    // Planner Tests
    // ========================================================================

    fn scenes_in_order(order: &[usize]) -> Vec<Scene> {
        order
            .iter()
            .map(|&i| Scene::new(i, format!("scene {}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_plan_sorts_by_index() {
        let mock = Arc::new(MockMediaProvider::new("mock").with_scenes(scenes_in_order(&[2, 0, 1])));
        let planner = ScenePlanner::new(mock);

        let scenes = planner
            .plan("a script", &ScenePlanParams::default())
            .await
            .unwrap();

        let indices: Vec<usize> = scenes.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_plan_rejects_gap_in_indices() {
        let mock = Arc::new(MockMediaProvider::new("mock").with_scenes(scenes_in_order(&[0, 2, 3])));
        let planner = ScenePlanner::new(mock);

        let err = planner
            .plan("a script", &ScenePlanParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    #[tokio::test]
    async fn test_plan_rejects_duplicate_indices() {
        let mock = Arc::new(MockMediaProvider::new("mock").with_scenes(scenes_in_order(&[0, 0, 1])));
        let planner = ScenePlanner::new(mock);

        let err = planner
            .plan("a script", &ScenePlanParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    #[tokio::test]
    async fn test_plan_rejects_empty_plan() {
        let mock = Arc::new(MockMediaProvider::new("mock").with_scenes(vec![]));
        let planner = ScenePlanner::new(mock);

        let err = planner
            .plan("a script", &ScenePlanParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::MalformedProviderResponse(_)));
    }

    #[tokio::test]
    async fn test_plan_checks_capability_before_calling() {
        let mock = Arc::new(
            MockMediaProvider::new("image-only")
                .with_capabilities(vec![MediaCapability::TextToImage]),
        );
        let planner = ScenePlanner::new(mock.clone());

        let err = planner
            .plan("a script", &ScenePlanParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ForgeError::UnsupportedCapability { .. }));
        assert_eq!(mock.call_count(MediaCapability::ScenePlanning), 0);
    }

    #[tokio::test]
    async fn test_plan_rejects_empty_script() {
        let mock = Arc::new(MockMediaProvider::new("mock"));
        let planner = ScenePlanner::new(mock);

        let err = planner
            .plan("   ", &ScenePlanParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ValidationError(_)));
    }

    // ========================================================================
    // Prompt Tests
    // ========================================================================

    #[test]
    fn test_director_prompt_contents() {
        let params = ScenePlanParams::new()
            .with_max_scenes(3)
            .with_target_duration(15.0);
        let prompt = director_prompt("A story about tides.", &params);

        assert!(prompt.contains("at most 3 scenes"));
        assert!(prompt.contains("15 seconds"));
        assert!(prompt.contains("visual_description"));
        assert!(prompt.contains("A story about tides."));
    }

    #[test]
    fn test_director_prompt_omits_unset_constraints() {
        let prompt = director_prompt("Script.", &ScenePlanParams::default());
        assert!(!prompt.contains("at most"));
        assert!(!prompt.contains("roughly"));
    }

    #[test]
    fn test_params_validate() {
        assert!(ScenePlanParams::new().validate().is_ok());
        assert!(ScenePlanParams::new().with_max_scenes(0).validate().is_err());
        assert!(ScenePlanParams::new()
            .with_target_duration(-2.0)
            .validate()
            .is_err());
    }
}

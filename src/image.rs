//! Image Generation Parameters
//!
//! Parameters for still-image synthesis, used directly and by the composed
//! pipeline's per-scene visual stage.

use serde::{Deserialize, Serialize};

/// Parameters for still-image generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationParams {
    /// Prompt describing the image
    pub prompt: String,
    /// Desired width in pixels
    pub width: Option<u32>,
    /// Desired height in pixels
    pub height: Option<u32>,
    /// Model override
    pub model: Option<String>,
}

impl ImageGenerationParams {
    /// Creates params with just a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: None,
            height: None,
            model: None,
        }
    }

    /// Sets the dimensions
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Returns "{width}x{height}", falling back to 1024x1024
    pub fn size_string(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            _ => "1024x1024".to_string(),
        }
    }

    /// Validates the parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Prompt cannot be empty".to_string());
        }

        if self.prompt.len() > 4000 {
            return Err("Prompt too long (max 4000 characters)".to_string());
        }

        if let Some(w) = self.width {
            if !(64..=4096).contains(&w) {
                return Err("Width must be between 64 and 4096".to_string());
            }
        }

        if let Some(h) = self.height {
            if !(64..=4096).contains(&h) {
                return Err("Height must be between 64 and 4096".to_string());
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_new() {
        let params = ImageGenerationParams::new("A lighthouse in a storm");

        assert_eq!(params.prompt, "A lighthouse in a storm");
        assert!(params.width.is_none());
        assert!(params.model.is_none());
    }

    #[test]
    fn test_params_builder() {
        let params = ImageGenerationParams::new("Test")
            .with_size(1920, 1080)
            .with_model("dall-e-3");

        assert_eq!(params.width, Some(1920));
        assert_eq!(params.height, Some(1080));
        assert_eq!(params.model.as_deref(), Some("dall-e-3"));
    }

    #[test]
    fn test_size_string() {
        let params = ImageGenerationParams::new("Test");
        assert_eq!(params.size_string(), "1024x1024");

        let params = params.with_size(1792, 1024);
        assert_eq!(params.size_string(), "1792x1024");
    }

    #[test]
    fn test_validate_success() {
        let params = ImageGenerationParams::new("Valid prompt").with_size(1024, 1024);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_prompt() {
        let params = ImageGenerationParams::new("  ");
        let result = params.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("empty"));
    }

    #[test]
    fn test_validate_prompt_too_long() {
        let params = ImageGenerationParams::new("x".repeat(4001));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_size() {
        let params = ImageGenerationParams::new("Test").with_size(10, 1024);
        let result = params.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Width"));
    }
}

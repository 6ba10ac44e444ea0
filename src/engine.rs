//! Media Engine
//!
//! Named provider registry plus the wiring that assembles the composed
//! pipeline from configured roles. Providers handed out by the engine are
//! budget-wrapped whenever the guard is enabled; the composed pipeline is
//! built from raw registered providers so the aggregate, not each
//! sub-call, is the guarded unit.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::assembler::FfmpegAssembler;
use crate::config::ForgeConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::guard::{BudgetAuthority, CostGuard};
use crate::pipeline::ComposedPipeline;
use crate::provider::{unsupported, MediaCapability, MediaProvider};
use crate::request::{GenerationRequest, GenerationResult};

/// Provider registry and pipeline factory
pub struct MediaEngine {
    /// Registered providers
    providers: Arc<RwLock<HashMap<String, Arc<dyn MediaProvider>>>>,
    /// Engine configuration, immutable for the engine's lifetime
    config: ForgeConfig,
    /// Budget authority consulted by guarded providers
    authority: Option<Arc<dyn BudgetAuthority>>,
}

impl MediaEngine {
    /// Creates an engine with default configuration
    pub fn new() -> Self {
        Self::with_config(ForgeConfig::default())
    }

    /// Creates an engine with config
    pub fn with_config(config: ForgeConfig) -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            config,
            authority: None,
        }
    }

    /// Attaches the budget authority consulted by guarded providers
    pub fn with_authority(mut self, authority: Arc<dyn BudgetAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Returns the engine configuration
    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Registers a provider under its own name
    pub async fn register_provider(&self, provider: Arc<dyn MediaProvider>) {
        let name = provider.name().to_string();
        let mut providers = self.providers.write().await;
        providers.insert(name.clone(), provider);
        info!(provider = %name, "registered provider");
    }

    /// Lists registered provider names
    pub async fn provider_names(&self) -> Vec<String> {
        let providers = self.providers.read().await;
        providers.keys().cloned().collect()
    }

    /// Lists providers offering a capability
    pub async fn providers_with_capability(&self, capability: MediaCapability) -> Vec<String> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .filter(|(_, p)| p.supports(capability))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns a provider by name, budget-wrapped when the guard is enabled
    pub async fn provider(&self, name: &str) -> ForgeResult<Arc<dyn MediaProvider>> {
        let provider = self
            .raw_provider(name)
            .await
            .ok_or_else(|| ForgeError::NotFound(format!("Provider not registered: {}", name)))?;
        Ok(self.guard_wrap(provider))
    }

    /// Picks a provider for a capability
    ///
    /// The role-configured name wins when it resolves to a provider
    /// supporting the capability; otherwise any registered provider that
    /// supports it and reports available.
    pub async fn default_provider_for(
        &self,
        capability: MediaCapability,
    ) -> ForgeResult<Arc<dyn MediaProvider>> {
        let role_name = match capability {
            MediaCapability::ScenePlanning => Some(self.config.roles.planning.as_str()),
            MediaCapability::TextToImage => Some(self.config.roles.image.as_str()),
            MediaCapability::ImageToVideo => Some(self.config.roles.animation.as_str()),
            MediaCapability::VoiceSynthesis => Some(self.config.roles.voice.as_str()),
            MediaCapability::TextToVideo => None,
        };

        if let Some(name) = role_name {
            if let Some(provider) = self.raw_provider(name).await {
                if provider.supports(capability) {
                    return Ok(self.guard_wrap(provider));
                }
            }
        }

        // Fall back to the first available provider with the capability
        let providers = self.providers.read().await;
        for provider in providers.values() {
            if provider.supports(capability) && provider.is_available() {
                return Ok(self.guard_wrap(provider.clone()));
            }
        }

        Err(unsupported(
            role_name.unwrap_or("any registered provider"),
            capability,
        ))
    }

    /// Dispatches a request to a named provider
    ///
    /// Validates the request, checks the capability, and routes to the
    /// matching operation on the (guarded) provider.
    pub async fn generate(
        &self,
        provider_name: &str,
        request: GenerationRequest,
        workdir: &Path,
    ) -> ForgeResult<GenerationResult> {
        request.validate().map_err(ForgeError::ValidationError)?;

        let provider = self.provider(provider_name).await?;
        let capability = request.required_capability();
        if !provider.supports(capability) {
            return Err(unsupported(provider_name, capability));
        }

        match request {
            GenerationRequest::TextToVideo { params } => provider
                .text_to_video(&params, workdir)
                .await
                .map(|path| GenerationResult::Video { path }),
            GenerationRequest::ImageToVideo { image, params } => provider
                .image_to_video(&image, &params, workdir)
                .await
                .map(|path| GenerationResult::Video { path }),
            GenerationRequest::ScenePlanning { script, params } => provider
                .generate_scenes(&script, &params)
                .await
                .map(|scenes| GenerationResult::ScenePlan { scenes }),
            GenerationRequest::VoiceSynthesis { text, params } => provider
                .generate_voice(&text, &params, workdir)
                .await
                .map(|path| GenerationResult::Voice { path }),
        }
    }

    /// Builds the composed pipeline from the configured role providers
    ///
    /// Role providers are taken raw so that a single guard around the
    /// returned pipeline checks the closed-form run estimate once, instead
    /// of re-checking budget on every sub-call.
    pub async fn composed(&self) -> ForgeResult<ComposedPipeline> {
        let planning = self
            .role_provider(&self.config.roles.planning, MediaCapability::ScenePlanning)
            .await?;
        let image = self
            .role_provider(&self.config.roles.image, MediaCapability::TextToImage)
            .await?;
        let animation = self
            .role_provider(&self.config.roles.animation, MediaCapability::ImageToVideo)
            .await?;
        let voice = self
            .role_provider(&self.config.roles.voice, MediaCapability::VoiceSynthesis)
            .await?;

        let assembler = Arc::new(FfmpegAssembler::from_config(&self.config.assembler));
        Ok(
            ComposedPipeline::new(planning, image, animation, voice, assembler)
                .with_costs(self.config.costs.clone())
                .with_limits(self.config.limits.clone()),
        )
    }

    /// Builds the composed pipeline and budget-wraps it as one unit
    pub async fn composed_guarded(&self) -> ForgeResult<Arc<dyn MediaProvider>> {
        let pipeline = Arc::new(self.composed().await?);
        Ok(self.guard_wrap(pipeline))
    }

    async fn raw_provider(&self, name: &str) -> Option<Arc<dyn MediaProvider>> {
        let providers = self.providers.read().await;
        providers.get(name).cloned()
    }

    /// Resolves one pipeline role to a raw registered provider
    async fn role_provider(
        &self,
        name: &str,
        capability: MediaCapability,
    ) -> ForgeResult<Arc<dyn MediaProvider>> {
        let provider = self.raw_provider(name).await.ok_or_else(|| {
            ForgeError::NotFound(format!("Provider not registered: {}", name))
        })?;
        if !provider.supports(capability) {
            return Err(unsupported(name, capability));
        }
        Ok(provider)
    }

    fn guard_wrap(&self, provider: Arc<dyn MediaProvider>) -> Arc<dyn MediaProvider> {
        if self.config.guard.enabled {
            CostGuard::wrap(provider, self.authority.clone())
        } else {
            provider
        }
    }
}

impl Default for MediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

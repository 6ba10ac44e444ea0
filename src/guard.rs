//! Cost Guard
//!
//! Decorator gating every provider call behind a budget check and recording
//! spend afterwards. The budget authority is an injected dependency; without
//! one, calls proceed unchecked (warned once per guard, never silently).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ForgeError, ForgeResult};
use crate::image::ImageGenerationParams;
use crate::planner::ScenePlanParams;
use crate::provider::{MediaCapability, MediaProvider};
use crate::request::GenerationRequest;
use crate::scene::Scene;
use crate::speech::SpeechParams;
use crate::video::VideoGenerationParams;

/// Estimated spend for one provider call, produced before submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Provider that will serve the call
    pub provider: String,
    /// Operation kind
    pub operation: MediaCapability,
    /// Estimated cost in USD
    pub cost: f64,
    /// Request descriptors (type, path, character counts)
    pub metadata: serde_json::Value,
}

/// Spend recorded after a successful provider call
///
/// Providers do not report actual billing, so the pre-flight estimate is
/// recorded as the spend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Provider that served the call
    pub provider: String,
    /// Operation kind
    pub operation: MediaCapability,
    /// Recorded cost in USD
    pub cost: f64,
    /// Request descriptors carried over from the estimate
    pub metadata: serde_json::Value,
    /// When the call completed
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Builds a record from the estimate that authorized the call
    pub fn from_estimate(estimate: &CostEstimate) -> Self {
        Self {
            provider: estimate.provider.clone(),
            operation: estimate.operation,
            cost: estimate.cost,
            metadata: estimate.metadata.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Budget enforcement contract
///
/// `check_budget` rejects a call whose estimate would break the budget;
/// `log_usage` records completed spend. Implementations must serialize
/// access so concurrent runs cannot race the same budget.
#[async_trait]
pub trait BudgetAuthority: Send + Sync {
    /// Approves or rejects an estimated spend
    async fn check_budget(&self, estimate: &CostEstimate) -> ForgeResult<()>;

    /// Records completed spend
    async fn log_usage(&self, record: &UsageRecord) -> ForgeResult<()>;
}

// ============================================================================
// CostGuard
// ============================================================================

/// Budget-checking decorator around any provider
pub struct CostGuard {
    inner: Arc<dyn MediaProvider>,
    authority: Option<Arc<dyn BudgetAuthority>>,
    warned_unchecked: AtomicBool,
}

impl CostGuard {
    /// Wraps a provider with budget enforcement
    ///
    /// Already-guarded providers are returned unchanged, so wrapping is
    /// idempotent: one check and one usage record per call regardless of
    /// how many times a provider passes through here.
    pub fn wrap(
        provider: Arc<dyn MediaProvider>,
        authority: Option<Arc<dyn BudgetAuthority>>,
    ) -> Arc<dyn MediaProvider> {
        if provider.is_cost_guarded() {
            return provider;
        }
        Arc::new(Self {
            inner: provider,
            authority,
            warned_unchecked: AtomicBool::new(false),
        })
    }

    /// Estimates the request and clears it with the authority
    async fn authorize(&self, request: &GenerationRequest) -> ForgeResult<CostEstimate> {
        let estimate = CostEstimate {
            provider: self.inner.name().to_string(),
            operation: request.required_capability(),
            cost: self.inner.estimate_cost(request),
            metadata: request.metadata(),
        };

        match &self.authority {
            Some(authority) => {
                // An unverifiable check is indistinguishable from a rejection.
                authority
                    .check_budget(&estimate)
                    .await
                    .map_err(|e| match e {
                        ForgeError::BudgetExceeded(_) => e,
                        other => ForgeError::BudgetExceeded(format!(
                            "budget check could not be completed: {}",
                            other
                        )),
                    })?;
                debug!(
                    provider = %estimate.provider,
                    operation = %estimate.operation,
                    cost = estimate.cost,
                    "budget check passed"
                );
            }
            None => {
                if !self.warned_unchecked.swap(true, Ordering::Relaxed) {
                    warn!(
                        provider = self.inner.name(),
                        "no budget authority attached; provider calls proceed unchecked"
                    );
                }
            }
        }

        Ok(estimate)
    }

    /// Records spend after a successful call; never fails the call
    async fn settle(&self, estimate: CostEstimate) {
        if let Some(authority) = &self.authority {
            let record = UsageRecord::from_estimate(&estimate);
            if let Err(e) = authority.log_usage(&record).await {
                warn!(
                    provider = %record.provider,
                    operation = %record.operation,
                    error = %e,
                    "usage logging failed"
                );
            }
        }
    }
}

#[async_trait]
impl MediaProvider for CostGuard {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> Vec<MediaCapability> {
        self.inner.capabilities()
    }

    fn supports(&self, capability: MediaCapability) -> bool {
        self.inner.supports(capability)
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn is_cost_guarded(&self) -> bool {
        true
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        self.inner.estimate_cost(request)
    }

    async fn text_to_video(
        &self,
        params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        let request = GenerationRequest::TextToVideo {
            params: params.clone(),
        };
        let estimate = self.authorize(&request).await?;
        let result = self.inner.text_to_video(params, workdir).await?;
        self.settle(estimate).await;
        Ok(result)
    }

    async fn image_to_video(
        &self,
        image: &Path,
        params: &VideoGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        let request = GenerationRequest::ImageToVideo {
            image: image.to_path_buf(),
            params: params.clone(),
        };
        let estimate = self.authorize(&request).await?;
        let result = self.inner.image_to_video(image, params, workdir).await?;
        self.settle(estimate).await;
        Ok(result)
    }

    async fn generate_image(
        &self,
        params: &ImageGenerationParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        // Still images have no standalone request kind; they are only
        // reached through the composed pipeline, whose aggregate estimate
        // already prices them. Pass through.
        self.inner.generate_image(params, workdir).await
    }

    async fn generate_scenes(
        &self,
        script: &str,
        params: &ScenePlanParams,
    ) -> ForgeResult<Vec<Scene>> {
        let request = GenerationRequest::ScenePlanning {
            script: script.to_string(),
            params: params.clone(),
        };
        let estimate = self.authorize(&request).await?;
        let result = self.inner.generate_scenes(script, params).await?;
        self.settle(estimate).await;
        Ok(result)
    }

    async fn generate_voice(
        &self,
        text: &str,
        params: &SpeechParams,
        workdir: &Path,
    ) -> ForgeResult<PathBuf> {
        let request = GenerationRequest::VoiceSynthesis {
            text: text.to_string(),
            params: params.clone(),
        };
        let estimate = self.authorize(&request).await?;
        let result = self.inner.generate_voice(text, params, workdir).await?;
        self.settle(estimate).await;
        Ok(result)
    }
}

// ============================================================================
// Fixed Budget Authority
// ============================================================================

struct Ledger {
    spent: f64,
    records: Vec<UsageRecord>,
}

/// In-process budget authority with a fixed spend ceiling
///
/// Checks and logs share one lock, so concurrent callers observe a
/// consistent ledger.
pub struct FixedBudgetAuthority {
    limit: f64,
    ledger: Mutex<Ledger>,
}

impl FixedBudgetAuthority {
    /// Creates an authority with a spend ceiling in USD
    pub fn new(limit: f64) -> Self {
        Self {
            limit,
            ledger: Mutex::new(Ledger {
                spent: 0.0,
                records: Vec::new(),
            }),
        }
    }

    /// Total recorded spend
    pub fn spent(&self) -> f64 {
        self.ledger.lock().unwrap().spent
    }

    /// All recorded usage
    pub fn records(&self) -> Vec<UsageRecord> {
        self.ledger.lock().unwrap().records.clone()
    }
}

#[async_trait]
impl BudgetAuthority for FixedBudgetAuthority {
    async fn check_budget(&self, estimate: &CostEstimate) -> ForgeResult<()> {
        let ledger = self.ledger.lock().unwrap();
        if ledger.spent + estimate.cost > self.limit {
            return Err(ForgeError::BudgetExceeded(format!(
                "estimated {:.4} USD would exceed the {:.2} USD limit ({:.4} already spent)",
                estimate.cost, self.limit, ledger.spent
            )));
        }
        Ok(())
    }

    async fn log_usage(&self, record: &UsageRecord) -> ForgeResult<()> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.spent += record.cost;
        ledger.records.push(record.clone());
        Ok(())
    }
}

// ============================================================================
// Mock Budget Authority
// ============================================================================

/// Mock authority for testing; counts calls and can fail either path
pub struct MockBudgetAuthority {
    reject: bool,
    fail_check: bool,
    fail_log: bool,
    check_calls: std::sync::atomic::AtomicUsize,
    log_calls: std::sync::atomic::AtomicUsize,
    records: Mutex<Vec<UsageRecord>>,
}

impl MockBudgetAuthority {
    /// Creates an authority approving everything
    pub fn new() -> Self {
        Self {
            reject: false,
            fail_check: false,
            fail_log: false,
            check_calls: std::sync::atomic::AtomicUsize::new(0),
            log_calls: std::sync::atomic::AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Rejects every check with `BudgetExceeded`
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::new()
        }
    }

    /// Makes `check_budget` fail with a transport error
    pub fn with_check_failure(mut self) -> Self {
        self.fail_check = true;
        self
    }

    /// Makes `log_usage` fail with a transport error
    pub fn with_log_failure(mut self) -> Self {
        self.fail_log = true;
        self
    }

    /// Number of budget checks performed
    pub fn check_count(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    /// Number of usage-log attempts
    pub fn log_count(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    /// Successfully recorded usage
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Default for MockBudgetAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BudgetAuthority for MockBudgetAuthority {
    async fn check_budget(&self, estimate: &CostEstimate) -> ForgeResult<()> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_check {
            return Err(ForgeError::Internal(
                "budget service unreachable".to_string(),
            ));
        }
        if self.reject {
            return Err(ForgeError::BudgetExceeded(format!(
                "rejected estimate of {:.4} USD",
                estimate.cost
            )));
        }
        Ok(())
    }

    async fn log_usage(&self, record: &UsageRecord) -> ForgeResult<()> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_log {
            return Err(ForgeError::Internal(
                "budget service unreachable".to_string(),
            ));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

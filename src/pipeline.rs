//! Wiring from `DigestConfig` to a ready `TwoPassSelector`, and the single
//! entry point `score_and_select`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::ScoreCache;
use crate::config::{test_mode_mock, DigestConfig};
use crate::error::ScoringError;
use crate::model::NewsItem;
use crate::provider::ProviderRegistry;
use crate::scoring::{
    BatchInvoker, CoarsePass, DeepPass, DigestRun, FallbackCoordinator, SelectorSettings,
    TwoPassSelector,
};

pub struct DigestPipeline {
    selector: TwoPassSelector,
}

impl DigestPipeline {
    /// Validate `config`, build adapters for its providers and assemble the
    /// selector. Configuration errors surface here, before any scoring.
    pub fn from_config(config: &DigestConfig) -> Result<Self, ScoringError> {
        config.validate()?;
        let registry = ProviderRegistry::from_profiles(config.providers.values(), test_mode_mock())?;
        Self::from_parts(config, registry)
    }

    /// Same as `from_config` but with a caller-built registry.
    pub fn from_parts(config: &DigestConfig, registry: ProviderRegistry) -> Result<Self, ScoringError> {
        config.validate()?;
        let primary = config.scoring.provider.as_str();
        if !registry.contains(primary) {
            return Err(ScoringError::Config(format!(
                "primary provider `{primary}` is not configured (missing API key?)"
            )));
        }

        let chain = registry.build_chain(primary, &config.fallback);
        let settings = SelectorSettings {
            thresholds: config.scoring.thresholds_by_category()?,
            default_threshold: config.scoring.default_threshold,
            quotas: config.scoring.quotas_by_category()?,
            target_items: config.scoring.target_items,
        };
        let invoker = BatchInvoker::new(
            Arc::new(registry),
            Duration::from_secs(config.scoring.batch_timeout_secs.max(1)),
            Duration::from_secs(config.scoring.acquire_timeout_secs),
        );
        let coordinator = FallbackCoordinator::new(invoker, config.fallback.max_retries);
        let deep = DeepPass::new(config.scoring.criteria, &config.scoring.language);
        let cache = ScoreCache::from_settings(&config.cache);

        info!(
            target: "scoring",
            chain = ?chain,
            target_items = settings.target_items,
            cache = cache.is_some(),
            "digest pipeline ready"
        );

        Ok(Self {
            selector: TwoPassSelector::new(
                coordinator,
                chain,
                CoarsePass::new(),
                deep,
                settings,
                cache,
            ),
        })
    }

    pub fn chain(&self) -> &[String] {
        self.selector.chain()
    }

    pub fn target_items(&self) -> usize {
        self.selector.settings().target_items
    }

    pub async fn run(&self, items: Vec<NewsItem>) -> DigestRun {
        self.selector.run(items, self.target_items()).await
    }

    pub async fn run_with_target(&self, items: Vec<NewsItem>, target: usize) -> DigestRun {
        self.selector.run(items, target).await
    }
}

/// Score, filter and rank `items`. Fails only on configuration errors; provider
/// trouble shows up as default-package items and diagnostics warnings.
pub async fn score_and_select(
    items: Vec<NewsItem>,
    config: &DigestConfig,
) -> Result<DigestRun, ScoringError> {
    let pipeline = DigestPipeline::from_config(config)?;
    Ok(pipeline.run(items).await)
}

//! Provider registry: profile + adapter + optional limiter per provider name,
//! and fallback chain construction.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ChatProvider, MockProvider, OpenAiCompatibleProvider, ProviderKind, ProviderProfile};
use crate::error::ScoringError;
use crate::ratelimit::RateLimiter;

fn default_chain() -> Vec<String> {
    vec!["deepseek".to_string(), "gemini".to_string()]
}
fn default_max_retries() -> u32 {
    1
}

/// Which providers to try after the primary, and how hard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub enabled: bool,
    #[serde(default = "default_chain")]
    pub chain: Vec<String>,
    /// Extra attempts on the same provider before moving down the chain.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: default_chain(),
            max_retries: default_max_retries(),
        }
    }
}

impl FallbackPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            chain: Vec::new(),
            max_retries: 0,
        }
    }
}

pub struct ProviderEntry {
    pub profile: ProviderProfile,
    pub adapter: Arc<dyn ChatProvider>,
    pub limiter: Option<RateLimiter>,
}

#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every configured profile. Profiles without
    /// credentials are skipped; with `force_mock` every adapter is the mock.
    pub fn from_profiles<'a, I>(profiles: I, force_mock: bool) -> Result<Self, ScoringError>
    where
        I: IntoIterator<Item = &'a ProviderProfile>,
    {
        let mut reg = Self::new();
        for profile in profiles {
            let adapter: Arc<dyn ChatProvider> = if force_mock || profile.kind == ProviderKind::Mock
            {
                Arc::new(MockProvider::new(&profile.name))
            } else if !profile.is_configured() {
                warn!(
                    target: "scoring",
                    provider = %profile.name,
                    "provider has no API key; treating as not configured"
                );
                continue;
            } else {
                Arc::new(OpenAiCompatibleProvider::from_profile(profile)?)
            };
            info!(
                target: "scoring",
                provider = %profile.name,
                adapter = adapter.kind(),
                model = %profile.model,
                rpm = ?profile.rate_limit_rpm,
                "provider registered"
            );
            reg.insert(profile.clone(), adapter);
        }
        Ok(reg)
    }

    /// Register (or replace) a provider with an explicit adapter.
    pub fn with_adapter(mut self, profile: ProviderProfile, adapter: Arc<dyn ChatProvider>) -> Self {
        self.insert(profile, adapter);
        self
    }

    fn insert(&mut self, profile: ProviderProfile, adapter: Arc<dyn ChatProvider>) {
        let limiter = profile.rate_limit_rpm.map(RateLimiter::per_minute);
        self.entries.insert(
            profile.name.clone(),
            ProviderEntry {
                profile,
                adapter,
                limiter,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ProviderEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    /// Primary first, then every known provider from the policy in order,
    /// without duplicates. Unknown names are skipped.
    pub fn build_chain(&self, primary: &str, policy: &FallbackPolicy) -> Vec<String> {
        let mut chain = vec![primary.to_string()];
        if !policy.enabled {
            return chain;
        }
        for name in &policy.chain {
            if chain.iter().any(|c| c == name) || !self.contains(name) {
                continue;
            }
            chain.push(name.clone());
        }
        chain
    }
}

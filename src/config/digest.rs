// src/config/digest.rs
//! Digest configuration: one immutable struct resolved once at startup from
//! TOML, with `${VAR}` placeholders substituted from the environment first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::Context;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::model::{Category, ScoringCriteria};
use crate::provider::{FallbackPolicy, ProviderProfile};

pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";

fn default_provider() -> String {
    "zhipu".to_string()
}
fn default_target_items() -> usize {
    30
}
fn default_batch_timeout_secs() -> u64 {
    90
}
fn default_acquire_timeout_secs() -> u64 {
    120
}
fn default_threshold() -> f64 {
    7.0
}
fn default_language() -> String {
    "Simplified Chinese".to_string()
}
fn default_thresholds() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("finance".to_string(), 5.5),
        ("tech".to_string(), 6.0),
        ("politics".to_string(), 5.5),
    ])
}
fn default_quotas() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("finance".to_string(), 0.40),
        ("tech".to_string(), 0.30),
        ("politics".to_string(), 0.30),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSettings {
    /// Primary provider name; must have a `[providers.<name>]` table.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_target_items")]
    pub target_items: usize,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Pass-1 threshold for categories without an explicit entry.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Output language for translated titles, summaries and key points.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub criteria: ScoringCriteria,
    /// Category label -> Pass-1 threshold (inclusive).
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, f64>,
    /// Category label -> share of the output.
    #[serde(default = "default_quotas")]
    pub quotas: BTreeMap<String, f64>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            target_items: default_target_items(),
            batch_timeout_secs: default_batch_timeout_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            default_threshold: default_threshold(),
            language: default_language(),
            criteria: ScoringCriteria::default(),
            thresholds: default_thresholds(),
            quotas: default_quotas(),
        }
    }
}

/// Parsed entries over the per-category defaults: a partial table only
/// overrides the categories it names.
fn by_category(
    section: &str,
    raw: &BTreeMap<String, f64>,
    defaults: BTreeMap<String, f64>,
) -> Result<BTreeMap<Category, f64>, ScoringError> {
    let mut out: BTreeMap<Category, f64> = defaults
        .iter()
        .filter_map(|(label, v)| Category::from_label(label).map(|c| (c, *v)))
        .collect();
    for (label, v) in raw {
        let c = Category::from_label(label).ok_or_else(|| {
            ScoringError::Config(format!("[scoring.{section}]: unknown category `{label}`"))
        })?;
        if !v.is_finite() || *v < 0.0 {
            return Err(ScoringError::Config(format!(
                "[scoring.{section}]: `{label}` must be a non-negative number"
            )));
        }
        out.insert(c, *v);
    }
    Ok(out)
}

impl ScoringSettings {
    pub fn thresholds_by_category(&self) -> Result<BTreeMap<Category, f64>, ScoringError> {
        by_category("thresholds", &self.thresholds, default_thresholds())
    }

    /// Set a category to 0.0 to give it no slots.
    pub fn quotas_by_category(&self) -> Result<BTreeMap<Category, f64>, ScoringError> {
        by_category("quotas", &self.quotas, default_quotas())
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/scores")
}
fn default_ttl_days() -> u32 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_cache_dir(),
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/history.json")
}
fn default_max_seen() -> usize {
    1000
}
fn default_max_runs() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_seen")]
    pub max_seen: usize,
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            max_seen: default_max_seen(),
            max_runs: default_max_runs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Category hint for every item of this feed.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub fallback: FallbackPolicy,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderProfile>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// Replace every `${VAR}` with `lookup(VAR)`; unknown variables become empty.
pub fn substitute_env<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    static RE_VAR: OnceCell<Regex> = OnceCell::new();
    let re = RE_VAR
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"));
    re.replace_all(raw, |caps: &regex::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl DigestConfig {
    /// Parse TOML after env substitution. Provider names come from table keys.
    pub fn from_toml_str<F>(raw: &str, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = substitute_env(raw, lookup);
        let mut cfg: DigestConfig = toml::from_str(&resolved).context("parse digest config")?;
        for (name, profile) in cfg.providers.iter_mut() {
            profile.name = name.clone();
            profile.api_key = profile.api_key.trim().to_string();
        }
        cfg.scoring.provider = cfg.scoring.provider.trim().to_string();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&raw, |k| env::var(k).ok())
    }

    /// `DIGEST_CONFIG_PATH` or `config/digest.toml`.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("DIGEST_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_file(path)
    }

    /// Startup checks. Any error here is fatal before scoring begins.
    pub fn validate(&self) -> Result<(), ScoringError> {
        let primary = &self.scoring.provider;
        if !self.providers.contains_key(primary) {
            return Err(ScoringError::Config(format!(
                "primary provider `{primary}` has no [providers.{primary}] section"
            )));
        }
        if self.fallback.enabled && self.fallback.chain.is_empty() {
            return Err(ScoringError::Config(
                "fallback is enabled but [fallback].chain is empty".into(),
            ));
        }
        for (name, p) in &self.providers {
            if p.batch_size == 0 || p.max_concurrent == 0 {
                return Err(ScoringError::Config(format!(
                    "provider `{name}`: batch_size and max_concurrent must be at least 1"
                )));
            }
            if p.rate_limit_rpm == Some(0) {
                return Err(ScoringError::Config(format!(
                    "provider `{name}`: rate_limit_rpm must be at least 1"
                )));
            }
        }
        self.scoring.thresholds_by_category()?;
        let quotas = self.scoring.quotas_by_category()?;
        if self.scoring.target_items > 0 && quotas.values().sum::<f64>() <= 0.0 {
            return Err(ScoringError::Config(
                "[scoring.quotas] must give at least one category a positive share".into(),
            ));
        }
        Ok(())
    }
}

/// `DIGEST_TEST_MODE=mock` swaps every provider adapter for the offline mock.
pub fn test_mode_mock() -> bool {
    env::var("DIGEST_TEST_MODE")
        .map(|v| v.trim().eq_ignore_ascii_case("mock"))
        .unwrap_or(false)
}

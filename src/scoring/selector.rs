//! Two-pass selection: coarse filter, deep scoring, quota selection.

use std::collections::BTreeMap;

use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::fallback::FallbackCoordinator;
use super::pass::{CoarsePass, DeepPass, ScoringPass};
use super::quota::select_by_quota;
use crate::cache::ScoreCache;
use crate::model::{item_id, Category, NewsItem};

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSettings {
    pub thresholds: BTreeMap<Category, f64>,
    /// Threshold for categories missing from `thresholds`.
    pub default_threshold: f64,
    pub quotas: BTreeMap<Category, f64>,
    pub target_items: usize,
}

/// Per-run counters for the caller's logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub attempted: usize,
    pub pass1_survivors: usize,
    pub pass1_dropped: usize,
    /// Survivors holding a real Pass-2 result (fresh or cached).
    pub scored: usize,
    /// Survivors holding the default package at the end of the run.
    pub defaulted: usize,
    /// Per-item failures over both passes, chain exhaustion included.
    pub item_failures: usize,
    pub cache_hits: usize,
    pub selected: usize,
    pub providers_used: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestRun {
    pub items: Vec<NewsItem>,
    pub diagnostics: RunDiagnostics,
}

pub struct TwoPassSelector {
    coordinator: FallbackCoordinator,
    chain: Vec<String>,
    coarse: CoarsePass,
    deep: DeepPass,
    settings: SelectorSettings,
    cache: Option<ScoreCache>,
}

impl TwoPassSelector {
    pub fn new(
        coordinator: FallbackCoordinator,
        chain: Vec<String>,
        coarse: CoarsePass,
        deep: DeepPass,
        settings: SelectorSettings,
        cache: Option<ScoreCache>,
    ) -> Self {
        Self {
            coordinator,
            chain,
            coarse,
            deep,
            settings,
            cache,
        }
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    pub fn threshold_for(&self, category: Option<Category>) -> f64 {
        category
            .and_then(|c| self.settings.thresholds.get(&c).copied())
            .unwrap_or(self.settings.default_threshold)
    }

    /// Inclusive threshold. Items defaulted in Pass 1 always survive.
    pub fn survives_pass1(&self, item: &NewsItem) -> bool {
        if item.score.defaulted {
            return true;
        }
        let score = item.score.coarse_score.unwrap_or(0.0);
        score >= self.threshold_for(item.effective_category())
    }

    /// Run one pass over `items` through the fallback chain. Never fails:
    /// items the chain could not score get the pass's default package.
    async fn run_pass<P: ScoringPass>(
        &self,
        pass: &P,
        items: Vec<NewsItem>,
        diag: &mut RunDiagnostics,
    ) -> Vec<NewsItem> {
        let (mut out, failures, used) = match self.coordinator.score(pass, items, &self.chain).await {
            Ok(r) => {
                for e in &r.batch_errors {
                    debug!(target: "scoring", pass = pass.name(), error = %e, "recovered batch failure");
                }
                (r.scored, r.item_failures, r.providers_used)
            }
            Err(exhausted) => {
                let err = exhausted.to_error();
                warn!(target: "scoring", pass = pass.name(), error = %err, "applying default package");
                diag.warnings.push(format!("{}: {err}", pass.name()));
                let mut partial = exhausted.partial;
                let unscored = exhausted.unscored.len();
                for mut item in exhausted.unscored {
                    pass.apply_default(&mut item);
                    partial.scored.push(item);
                }
                partial.scored.sort_by_key(|it| it.seq);
                (
                    partial.scored,
                    partial.item_failures + unscored,
                    partial.providers_used,
                )
            }
        };
        diag.item_failures += failures;
        for p in used {
            if !diag.providers_used.contains(&p) {
                diag.providers_used.push(p);
            }
        }
        out.sort_by_key(|it| it.seq);
        out
    }

    /// Score `items` and pick at most `target` of them.
    pub async fn run(&self, mut items: Vec<NewsItem>, target: usize) -> DigestRun {
        super::ensure_metrics_described();

        let mut diag = RunDiagnostics {
            attempted: items.len(),
            ..RunDiagnostics::default()
        };
        counter!("digest_items_attempted_total").increment(items.len() as u64);

        for (seq, item) in items.iter_mut().enumerate() {
            item.seq = seq;
            if item.id.trim().is_empty() {
                let basis = if item.link.trim().is_empty() {
                    &item.title
                } else {
                    &item.link
                };
                item.id = item_id(basis);
            }
        }

        // Pass 1
        let coarse = self.run_pass(&self.coarse, items, &mut diag).await;
        let (survivors, dropped): (Vec<NewsItem>, Vec<NewsItem>) =
            coarse.into_iter().partition(|it| self.survives_pass1(it));
        diag.pass1_survivors = survivors.len();
        diag.pass1_dropped = dropped.len();
        counter!("digest_pass1_dropped_total").increment(dropped.len() as u64);
        debug!(
            target: "scoring",
            survivors = survivors.len(),
            dropped = dropped.len(),
            "pass1 filter applied"
        );

        // Pass 2, cache first
        let mut deep = Vec::with_capacity(survivors.len());
        let mut misses = Vec::new();
        for mut item in survivors {
            match self.cache.as_ref().and_then(|c| c.get(&item)) {
                Some(hit) => {
                    self.deep.apply(&mut item, hit);
                    diag.cache_hits += 1;
                    deep.push(item);
                }
                None => misses.push(item),
            }
        }
        counter!("digest_cache_hits_total").increment(diag.cache_hits as u64);

        let fresh = self.run_pass(&self.deep, misses, &mut diag).await;
        if let Some(cache) = &self.cache {
            for item in &fresh {
                if let Err(e) = cache.put(item) {
                    warn!(target: "scoring", item = %item.id, error = %e, "score cache write failed");
                }
            }
        }
        deep.extend(fresh);
        deep.sort_by_key(|it| it.seq);

        diag.defaulted = deep.iter().filter(|it| it.score.defaulted).count();
        diag.scored = deep.len() - diag.defaulted;
        counter!("digest_items_defaulted_total").increment(diag.defaulted as u64);

        // Selection
        let selected = select_by_quota(deep, target, &self.settings.quotas);
        diag.selected = selected.len();
        counter!("digest_items_selected_total").increment(selected.len() as u64);
        gauge!("digest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        info!(
            target: "scoring",
            attempted = diag.attempted,
            survivors = diag.pass1_survivors,
            scored = diag.scored,
            defaulted = diag.defaulted,
            cache_hits = diag.cache_hits,
            selected = diag.selected,
            providers = ?diag.providers_used,
            "digest run finished"
        );

        DigestRun {
            items: selected,
            diagnostics: diag,
        }
    }
}

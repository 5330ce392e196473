// src/scoring/mod.rs
pub mod fallback;
pub mod invoker;
pub mod pass;
pub mod quota;
pub mod selector;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use fallback::{ChainExhausted, ChainResult, FallbackCoordinator};
pub use invoker::{BatchInvoker, InvokeOutcome};
pub use pass::{CoarseAssessment, CoarsePass, DeepAssessment, DeepPass, ScoringPass};
pub use quota::{allocate_targets, rank_cmp, select_by_quota};
pub use selector::{DigestRun, RunDiagnostics, SelectorSettings, TwoPassSelector};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_items_attempted_total",
            "Items handed to the scoring pipeline."
        );
        describe_counter!(
            "digest_items_defaulted_total",
            "Items that ended a run with the default-on-failure package."
        );
        describe_counter!(
            "digest_pass1_dropped_total",
            "Items below their category threshold after Pass 1."
        );
        describe_counter!(
            "digest_items_selected_total",
            "Items selected into the digest."
        );
        describe_counter!(
            "digest_provider_batch_failures_total",
            "Sub-batches that failed batch-wide, by provider."
        );
        describe_counter!(
            "digest_chain_exhausted_total",
            "Passes where every provider in the chain failed for some items."
        );
        describe_counter!("digest_cache_hits_total", "Pass-2 score cache hits.");
        describe_histogram!(
            "digest_ratelimit_wait_ms",
            "Time spent waiting for provider rate-limit tokens."
        );
        describe_gauge!("digest_last_run_ts", "Unix ts of the last finished run.");
    });
}

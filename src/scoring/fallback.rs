//! Fallback coordinator: walk the provider chain until every sub-batch is
//! scored. Only sub-batches that failed batch-wide move down the chain; items
//! already scored are never sent again.

use std::time::Duration;

use metrics::counter;
use tracing::{info, warn};

use super::invoker::{is_provider_dead, BatchInvoker};
use super::pass::ScoringPass;
use crate::error::{ProviderError, ScoringError};
use crate::model::NewsItem;

const RETRY_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct ChainResult {
    /// Items written by the pass, in insertion order.
    pub scored: Vec<NewsItem>,
    pub item_failures: usize,
    /// Providers that scored at least one item, in first-use order.
    pub providers_used: Vec<String>,
    pub batch_errors: Vec<ProviderError>,
}

/// Every provider failed batch-wide for some items. `partial` keeps what was
/// scored; `unscored` is returned untouched for the caller to default.
#[derive(Debug)]
pub struct ChainExhausted {
    pub tried: Vec<String>,
    pub partial: ChainResult,
    pub unscored: Vec<NewsItem>,
}

impl ChainExhausted {
    pub fn to_error(&self) -> ScoringError {
        ScoringError::AllProvidersExhausted {
            tried: self.tried.clone(),
            unscored: self.unscored.len(),
        }
    }
}

/// Credentials and routing problems do not heal by waiting.
fn is_retryable(errors: &[ProviderError]) -> bool {
    !errors.is_empty() && !errors.iter().any(is_provider_dead)
}

pub struct FallbackCoordinator {
    invoker: BatchInvoker,
    max_retries: u32,
}

impl FallbackCoordinator {
    pub fn new(invoker: BatchInvoker, max_retries: u32) -> Self {
        Self {
            invoker,
            max_retries,
        }
    }

    pub fn invoker(&self) -> &BatchInvoker {
        &self.invoker
    }

    pub async fn score<P: ScoringPass>(
        &self,
        pass: &P,
        items: Vec<NewsItem>,
        chain: &[String],
    ) -> Result<ChainResult, ChainExhausted> {
        let mut result = ChainResult::default();
        let mut tried = Vec::new();

        // `seq` holds the input position while the chain runs.
        let mut pending = items;
        let original_seq: Vec<usize> = pending.iter().map(|it| it.seq).collect();
        for (pos, it) in pending.iter_mut().enumerate() {
            it.seq = pos;
        }
        let restore = |v: &mut Vec<NewsItem>| {
            v.sort_by_key(|it| it.seq);
            for it in v.iter_mut() {
                it.seq = original_seq[it.seq];
            }
        };

        for provider in chain {
            if pending.is_empty() {
                break;
            }
            tried.push(provider.clone());

            let mut attempt: u32 = 0;
            loop {
                let outcome = self.invoker.invoke(provider, pass, pending).await;
                if !outcome.scored.is_empty() && !result.providers_used.contains(provider) {
                    result.providers_used.push(provider.clone());
                }
                result.item_failures += outcome.item_failures;
                result.scored.extend(outcome.scored);
                pending = outcome.failed;
                if pending.is_empty() {
                    break;
                }

                let retryable = is_retryable(&outcome.batch_errors);
                result.batch_errors.extend(outcome.batch_errors);
                attempt += 1;
                if !retryable || attempt > self.max_retries {
                    warn!(
                        target: "fallback",
                        provider = %provider,
                        pass = pass.name(),
                        remaining = pending.len(),
                        "provider gave up; moving down the chain"
                    );
                    break;
                }

                let delay = RETRY_BASE * (1u32 << (attempt - 1).min(6));
                info!(
                    target: "fallback",
                    provider = %provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    remaining = pending.len(),
                    "retrying failed sub-batches"
                );
                tokio::time::sleep(delay).await;
            }
        }

        restore(&mut result.scored);

        if pending.is_empty() {
            Ok(result)
        } else {
            counter!("digest_chain_exhausted_total").increment(1);
            warn!(
                target: "fallback",
                tried = ?tried,
                pass = pass.name(),
                unscored = pending.len(),
                "all providers exhausted"
            );
            restore(&mut pending);
            Err(ChainExhausted {
                tried,
                partial: result,
                unscored: pending,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;

    #[test]
    fn auth_and_endpoint_are_not_retried() {
        let e = |k| ProviderError::new("p", k, "x");
        assert!(is_retryable(&[e(ProviderErrorKind::Timeout)]));
        assert!(is_retryable(&[e(ProviderErrorKind::RateLimitWait)]));
        assert!(!is_retryable(&[e(ProviderErrorKind::Auth)]));
        assert!(!is_retryable(&[
            e(ProviderErrorKind::Timeout),
            e(ProviderErrorKind::Endpoint)
        ]));
        assert!(!is_retryable(&[]));
    }
}

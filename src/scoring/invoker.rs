//! Batch invoker: one provider, one pass, many items.
//!
//! Items are split into sub-batches of `batch_size`; each sub-batch runs at
//! most `max_concurrent` calls at a time under a single batch timeout. Items are
//! only written after their whole sub-batch finished, so a sub-batch that is
//! re-routed to another provider carries untouched items.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::counter;
use tracing::{debug, warn};

use super::pass::ScoringPass;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::model::NewsItem;
use crate::provider::{ChatRequest, ProviderEntry, ProviderRegistry};

/// Result of invoking one provider over a list of items.
#[derive(Debug, Default)]
pub struct InvokeOutcome {
    /// Items written by the pass: real results plus per-item defaults.
    pub scored: Vec<NewsItem>,
    /// Items of sub-batches that failed batch-wide; left untouched.
    pub failed: Vec<NewsItem>,
    /// How many items in `scored` carry the default package.
    pub item_failures: usize,
    pub batch_errors: Vec<ProviderError>,
}

/// Auth and Endpoint failures hold for every later call to the provider.
pub(crate) fn is_provider_dead(e: &ProviderError) -> bool {
    matches!(e.kind, ProviderErrorKind::Auth | ProviderErrorKind::Endpoint)
}

enum CallError {
    Item(String),
    Batch(ProviderError),
}

pub struct BatchInvoker {
    registry: Arc<ProviderRegistry>,
    batch_timeout: Duration,
    acquire_timeout: Duration,
}

impl BatchInvoker {
    pub fn new(registry: Arc<ProviderRegistry>, batch_timeout: Duration, acquire_timeout: Duration) -> Self {
        Self {
            registry,
            batch_timeout,
            acquire_timeout,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn invoke<P: ScoringPass>(
        &self,
        provider: &str,
        pass: &P,
        items: Vec<NewsItem>,
    ) -> InvokeOutcome {
        let mut outcome = InvokeOutcome::default();
        if items.is_empty() {
            return outcome;
        }

        let Some(entry) = self.registry.get(provider) else {
            outcome.batch_errors.push(ProviderError::new(
                provider,
                ProviderErrorKind::Endpoint,
                "provider is not registered",
            ));
            outcome.failed = items;
            return outcome;
        };

        let batch_size = entry.profile.batch_size.max(1);
        let mut rest = items.into_iter();
        loop {
            let chunk: Vec<NewsItem> = rest.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            if outcome.batch_errors.iter().any(is_provider_dead) {
                // Credentials or routing are broken; later sub-batches go
                // straight to the next provider.
                outcome.failed.extend(chunk);
                outcome.failed.extend(rest.by_ref());
                break;
            }

            match self.run_sub_batch(entry, pass, &chunk).await {
                Ok(results) => {
                    for (mut item, result) in chunk.into_iter().zip(results) {
                        match result {
                            Ok(output) => pass.apply(&mut item, output),
                            Err(reason) => {
                                warn!(
                                    target: "scoring",
                                    provider,
                                    pass = pass.name(),
                                    item = %item.id,
                                    %reason,
                                    "item scoring failed; default package applied"
                                );
                                pass.apply_default(&mut item);
                                outcome.item_failures += 1;
                            }
                        }
                        outcome.scored.push(item);
                    }
                }
                Err(e) => {
                    warn!(
                        target: "scoring",
                        provider,
                        pass = pass.name(),
                        items = chunk.len(),
                        error = %e,
                        "sub-batch failed batch-wide"
                    );
                    counter!("digest_provider_batch_failures_total", "provider" => provider.to_string())
                        .increment(1);
                    outcome.batch_errors.push(e);
                    outcome.failed.extend(chunk);
                }
            }
        }

        debug!(
            target: "scoring",
            provider,
            pass = pass.name(),
            scored = outcome.scored.len(),
            failed = outcome.failed.len(),
            item_failures = outcome.item_failures,
            "invoke finished"
        );
        outcome
    }

    /// Results in item order, or the first batch-wide error. Dropping the
    /// stream on early return cancels the calls still in flight.
    async fn run_sub_batch<P: ScoringPass>(
        &self,
        entry: &ProviderEntry,
        pass: &P,
        chunk: &[NewsItem],
    ) -> Result<Vec<Result<P::Output, String>>, ProviderError> {
        let calls: Vec<_> = chunk
            .iter()
            .enumerate()
            .map(|(idx, item)| async move { (idx, self.call_one(entry, pass, item).await) })
            .collect();

        let run = async {
            let mut slots: Vec<Option<Result<P::Output, String>>> =
                (0..chunk.len()).map(|_| None).collect();
            let mut pending = stream::iter(calls).buffer_unordered(entry.profile.max_concurrent.max(1));
            while let Some((idx, result)) = pending.next().await {
                slots[idx] = Some(match result {
                    Ok(output) => Ok(output),
                    Err(CallError::Item(reason)) => Err(reason),
                    Err(CallError::Batch(e)) => return Err(e),
                });
            }
            Ok(slots
                .into_iter()
                .map(|s| s.unwrap_or_else(|| Err("no result".to_string())))
                .collect())
        };

        match tokio::time::timeout(self.batch_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(
                &entry.profile.name,
                ProviderErrorKind::Timeout,
                format!("sub-batch exceeded {:?}", self.batch_timeout),
            )),
        }
    }

    async fn call_one<P: ScoringPass>(
        &self,
        entry: &ProviderEntry,
        pass: &P,
        item: &NewsItem,
    ) -> Result<P::Output, CallError> {
        if let Some(limiter) = &entry.limiter {
            limiter.acquire(self.acquire_timeout).await.map_err(|e| {
                CallError::Batch(ProviderError::new(
                    &entry.profile.name,
                    ProviderErrorKind::RateLimitWait,
                    e.to_string(),
                ))
            })?;
        }

        let request = ChatRequest {
            model: entry.profile.model.clone(),
            system_prompt: pass.system_prompt().to_string(),
            user_content: pass.user_content(item),
            max_tokens: entry.profile.max_tokens,
            temperature: entry.profile.temperature,
            json_mode: true,
        };

        let value = entry.adapter.call(&request).await.map_err(|e| {
            if e.is_batch_wide() {
                CallError::Batch(e)
            } else {
                CallError::Item(e.to_string())
            }
        })?;

        pass.parse(&value).map_err(|e| CallError::Item(e.to_string()))
    }
}

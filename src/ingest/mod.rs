// src/ingest/mod.rs
pub mod rss;

use std::collections::HashSet;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::history::RunHistory;
use crate::model::NewsItem;

pub use rss::RssFeedSource;

/// A feed of raw news items.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_items(&self) -> anyhow::Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items parsed from feeds.");
        describe_counter!(
            "ingest_dedup_total",
            "Items dropped as duplicates within one collection."
        );
        describe_counter!(
            "ingest_seen_total",
            "Items dropped because a previous run already published them."
        );
        describe_counter!("ingest_source_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Entity decode, tag strip, whitespace collapse, 1500-char cap.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("static pattern"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedup_by_id(items: Vec<NewsItem>) -> (Vec<NewsItem>, usize) {
    let mut seen = HashSet::with_capacity(items.len());
    let mut dropped = 0usize;
    let kept = items
        .into_iter()
        .filter(|it| {
            let fresh = seen.insert(it.id.clone());
            if !fresh {
                dropped += 1;
            }
            fresh
        })
        .collect();
    (kept, dropped)
}

/// Fetch every source once. A failing source is logged and skipped.
/// Items already recorded in `history` are dropped.
pub async fn collect_items(
    sources: &[Box<dyn ItemSource>],
    history: Option<&RunHistory>,
) -> Vec<NewsItem> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for s in sources {
        match s.fetch_items().await {
            Ok(mut v) => {
                tracing::debug!(target: "ingest", source = s.name(), items = v.len(), "source fetched");
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, source = s.name(), "source error");
                counter!("ingest_source_errors_total").increment(1);
            }
        }
    }

    let (mut kept, dup) = dedup_by_id(raw);
    counter!("ingest_dedup_total").increment(dup as u64);

    if let Some(h) = history {
        let before = kept.len();
        kept = h.filter_unseen(kept);
        counter!("ingest_seen_total").increment((before - kept.len()) as u64);
    }

    tracing::info!(target: "ingest", items = kept.len(), duplicates = dup, "collection finished");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn normalize_keeps_punctuation() {
        let s = "  Hello,&nbsp;&nbsp; <b>world</b>!!!  ";
        assert_eq!(normalize_text(s), "Hello, world !!!");
    }

    #[test]
    fn dedup_keeps_first() {
        let mk = |t: &str, url: &str| NewsItem::new(t, url, "s", Utc::now(), "");
        let (kept, dropped) = dedup_by_id(vec![
            mk("a", "https://x/1"),
            mk("b", "https://x/1"),
            mk("c", "https://x/2"),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(
            kept.iter().map(|i| i.title.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
    }
}

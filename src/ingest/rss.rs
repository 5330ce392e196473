// src/ingest/rss.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{normalize_text, ItemSource};
use crate::config::FeedConfig;
use crate::model::{Category, NewsItem};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

/// Named HTML entities are not valid XML; map the common ones first.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

/// RSS 2.0 feed, fetched over HTTP or parsed from an in-memory document.
pub struct RssFeedSource {
    name: String,
    category: Option<Category>,
    mode: Mode,
}

impl RssFeedSource {
    pub fn from_fixture_str(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            category: None,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("news-digest/0.1")
            .timeout(Duration::from_secs(20))
            .build()
            .context("build feed http client")?;
        Ok(Self {
            name: name.into(),
            category: None,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    pub fn from_feed_config(cfg: &FeedConfig) -> Result<Self> {
        let category = match cfg.category.as_deref() {
            Some(label) => Some(
                Category::from_label(label)
                    .with_context(|| format!("feed `{}`: unknown category `{label}`", cfg.name))?,
            ),
            None => None,
        };
        Ok(Self::from_url(&cfg.name, &cfg.url)?.with_category(category))
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<NewsItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .with_context(|| format!("parsing rss xml from {}", self.name))?;

        let fetched_at = Utc::now();
        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let link = it.link.map(|l| l.trim().to_string()).unwrap_or_default();
            let published_at = it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or(fetched_at);
            let summary = normalize_text(it.description.as_deref().unwrap_or_default());

            let mut item = NewsItem::new(title, link, self.name.clone(), published_at, summary);
            if item.link.is_empty() {
                item.id = crate::model::item_id(&item.title);
            }
            item.category = self.category;
            out.push(item);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl ItemSource for RssFeedSource {
    async fn fetch_items(&self) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("{} http get", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http body", self.name))?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

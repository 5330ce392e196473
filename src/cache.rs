//! File-backed cache of Pass-2 assessments.
//!
//! Keyed by SHA-256 of the title plus the first 200 characters of the
//! summary. Entries older than the TTL are ignored. Totals are not stored:
//! a hit is applied through the deep pass, which recomputes the weighted sum
//! with the criteria currently in effect.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::CacheSettings;
use crate::model::NewsItem;
use crate::scoring::pass::DeepAssessment;

const KEY_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    assessment: DeepAssessment,
}

#[derive(Debug, Clone)]
pub struct ScoreCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ScoreCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_days: u32) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(target: "scoring", dir = %dir.display(), error = %e, "score cache dir not created");
        }
        Self {
            dir,
            ttl: Duration::days(i64::from(ttl_days)),
        }
    }

    /// `None` when caching is disabled.
    pub fn from_settings(settings: &CacheSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(&settings.dir, settings.ttl_days))
    }

    pub fn key(title: &str, summary: &str) -> String {
        let head: String = summary.chars().take(KEY_SUMMARY_CHARS).collect();
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(head.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    fn path(&self, key: &str) -> PathBuf {
        cache_path(&self.dir, key)
    }

    pub fn get(&self, item: &NewsItem) -> Option<DeepAssessment> {
        self.get_at(item, Utc::now())
    }

    pub fn get_at(&self, item: &NewsItem, now: DateTime<Utc>) -> Option<DeepAssessment> {
        let key = Self::key(&item.title, &item.summary);
        let raw = fs::read_to_string(self.path(&key)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&raw).ok()?;
        if now - entry.stored_at > self.ttl {
            return None;
        }
        Some(entry.assessment)
    }

    /// Store the item's Pass-2 result. Items carrying the default package or
    /// lacking dimensions are not cached.
    pub fn put(&self, item: &NewsItem) -> io::Result<bool> {
        let Some(assessment) = assessment_of(item) else {
            return Ok(false);
        };
        let entry = CacheEntry {
            stored_at: Utc::now(),
            assessment,
        };
        let key = Self::key(&item.title, &item.summary);
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.path(&key), &entry)?;
        Ok(true)
    }
}

fn assessment_of(item: &NewsItem) -> Option<DeepAssessment> {
    let card = &item.score;
    if card.defaulted {
        return None;
    }
    Some(DeepAssessment {
        dimensions: card.dimensions?,
        translated_title: card.translated_title.clone(),
        summary: card.summary.clone(),
        key_points: card.key_points.clone(),
    })
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn write_atomic(path: &Path, entry: &CacheEntry) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(entry).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, DimensionScores, ScoreCard};

    fn scored_item() -> NewsItem {
        let mut it = NewsItem::new("Title", "https://x/1", "src", Utc::now(), "Body");
        it.score = ScoreCard {
            category: Some(Category::Finance),
            coarse_score: Some(6.0),
            dimensions: Some(DimensionScores {
                importance: 7.0,
                timeliness: 7.0,
                technical_depth: 7.0,
                audience_breadth: 7.0,
                practicality: 7.0,
            }),
            total_score: Some(7.0),
            translated_title: Some("标题".into()),
            summary: Some("摘要".into()),
            key_points: vec!["要点".into()],
            defaulted: false,
        };
        it
    }

    #[test]
    fn key_uses_only_the_summary_head() {
        let long_a = format!("{}{}", "x".repeat(200), "tail-a");
        let long_b = format!("{}{}", "x".repeat(200), "tail-b");
        assert_eq!(ScoreCache::key("t", &long_a), ScoreCache::key("t", &long_b));
        assert_ne!(ScoreCache::key("t", "a"), ScoreCache::key("u", "a"));
        assert_eq!(ScoreCache::key("t", "a").len(), 64);
    }

    #[test]
    fn roundtrip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ScoreCache::new(dir.path(), 7);
        let it = scored_item();
        assert!(cache.get(&it).is_none());
        assert!(cache.put(&it).unwrap());

        let hit = cache.get(&it).unwrap();
        assert_eq!(hit.translated_title.as_deref(), Some("标题"));
        assert_eq!(hit.key_points, vec!["要点"]);

        let later = Utc::now() + Duration::days(8);
        assert!(cache.get_at(&it, later).is_none());
    }

    #[test]
    fn defaulted_items_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ScoreCache::new(dir.path(), 7);
        let mut it = scored_item();
        it.apply_failure();
        assert!(!cache.put(&it).unwrap());
        assert!(cache.get(&it).is_none());
    }

    #[test]
    fn unusable_dir_surfaces_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let cache = ScoreCache::new(blocker.join("cache"), 7);
        let it = scored_item();
        assert!(cache.put(&it).is_err());
        assert!(cache.get(&it).is_none());
    }

    #[test]
    fn dir_removed_after_startup_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let cache = ScoreCache::new(&root, 7);
        fs::remove_dir_all(&root).unwrap();

        let it = scored_item();
        assert!(cache.put(&it).unwrap());
        assert!(cache.get(&it).is_some());
    }
}

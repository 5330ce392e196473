//! # Data model
//! News items flowing through the scoring pipeline and the scoring payload
//! (`ScoreCard`) the two passes write into them.
//!
//! A `ScoreCard` is only ever replaced as a whole by one pass: either a
//! complete result from the provider or the default-on-failure package.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Neutral total score assigned when scoring fails (0 to 10 scale).
pub const DEFAULT_FAILURE_SCORE: f64 = 5.0;

/// Summary marker carried by items that received the default package.
pub const SCORING_FAILED_MARKER: &str = "[scoring failed]";

/// Digest sections. Closed set; the model is asked to pick one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Finance,
    Tech,
    Politics,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Finance, Category::Tech, Category::Politics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Finance => "finance",
            Category::Tech => "tech",
            Category::Politics => "politics",
        }
    }

    /// Lenient label mapping for model output. Accepts English names and the
    /// Chinese section names used by the digest ("财经", "科技", "社会政治").
    pub fn from_label(label: &str) -> Option<Category> {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "finance" | "financial" | "economy" | "business" | "财经" => Some(Category::Finance),
            "tech" | "technology" | "science" | "科技" => Some(Category::Tech),
            "politics" | "political" | "society" | "social" | "社会政治" | "政治" => {
                Some(Category::Politics)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity derived from the item URL (first 16 hex chars of SHA-256).
pub fn item_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Per-dimension scores on a 0 to 10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub importance: f64,
    pub timeliness: f64,
    pub technical_depth: f64,
    pub audience_breadth: f64,
    pub practicality: f64,
}

/// Weight per scoring dimension. Expected to sum to 1.0, not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringCriteria {
    pub importance: f64,
    pub timeliness: f64,
    pub technical_depth: f64,
    pub audience_breadth: f64,
    pub practicality: f64,
}

impl Default for ScoringCriteria {
    fn default() -> Self {
        Self {
            importance: 0.30,
            timeliness: 0.20,
            technical_depth: 0.20,
            audience_breadth: 0.15,
            practicality: 0.15,
        }
    }
}

impl ScoringCriteria {
    /// Weighted sum of the dimension scores.
    pub fn total(&self, d: &DimensionScores) -> f64 {
        d.importance * self.importance
            + d.timeliness * self.timeliness
            + d.technical_depth * self.technical_depth
            + d.audience_breadth * self.audience_breadth
            + d.practicality * self.practicality
    }

    pub fn weight_sum(&self) -> f64 {
        self.importance
            + self.timeliness
            + self.technical_depth
            + self.audience_breadth
            + self.practicality
    }
}

/// Scoring payload written by the two passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreCard {
    /// Category assigned by Pass 1.
    pub category: Option<Category>,
    /// Coarse Pass-1 score.
    pub coarse_score: Option<f64>,
    pub dimensions: Option<DimensionScores>,
    /// Weighted total (Pass 2) or the neutral default after a failure.
    pub total_score: Option<f64>,
    pub translated_title: Option<String>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    /// True while the item carries the default-on-failure package.
    pub defaulted: bool,
}

impl ScoreCard {
    /// Default-on-failure package: neutral score, original title, explicit
    /// failure marker, no key points. The assigned category is preserved.
    pub fn failed(title: &str, category: Option<Category>) -> Self {
        Self {
            category,
            coarse_score: Some(DEFAULT_FAILURE_SCORE),
            dimensions: None,
            total_score: Some(DEFAULT_FAILURE_SCORE),
            translated_title: Some(title.to_string()),
            summary: Some(SCORING_FAILED_MARKER.to_string()),
            key_points: Vec::new(),
            defaulted: true,
        }
    }
}

/// A single ingested article plus its scoring payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Derived from `link` when left empty.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub source: String,
    /// Feed-level category hint; may be absent until classified.
    #[serde(default)]
    pub category: Option<Category>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub score: ScoreCard,
    /// Insertion order within a run; used as the final ranking tie-breaker.
    #[serde(skip)]
    pub(crate) seq: usize,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        source: impl Into<String>,
        published_at: DateTime<Utc>,
        summary: impl Into<String>,
    ) -> Self {
        let link = link.into();
        Self {
            id: item_id(&link),
            title: title.into(),
            link,
            source: source.into(),
            category: None,
            published_at,
            summary: summary.into(),
            score: ScoreCard::default(),
            seq: 0,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Category used for thresholds and quotas: the assigned one, else the feed hint.
    pub fn effective_category(&self) -> Option<Category> {
        self.score.category.or(self.category)
    }

    pub fn total_score(&self) -> f64 {
        self.score.total_score.unwrap_or(0.0)
    }

    /// Replace the scoring payload with the default package.
    pub fn apply_failure(&mut self) {
        let category = self.effective_category().or(Some(Category::Politics));
        self.score = ScoreCard::failed(&self.title, category);
    }
}

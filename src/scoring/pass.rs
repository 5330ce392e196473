//! The two scoring passes as data: prompt, per-item request body, response
//! validation and how a validated response is written into an item.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ParseError;
use crate::model::{Category, DimensionScores, NewsItem, ScoreCard, ScoringCriteria};

const MAX_INPUT_SUMMARY_CHARS: usize = 300;
const MAX_SUMMARY_CHARS: usize = 600;
const MAX_TITLE_CHARS: usize = 300;
const MAX_KEY_POINT_CHARS: usize = 200;
const MAX_KEY_POINTS: usize = 5;

/// One round-trip shape the invoker can drive.
pub trait ScoringPass: Send + Sync {
    type Output: Send + 'static;

    fn name(&self) -> &'static str;
    fn system_prompt(&self) -> &str;
    fn user_content(&self, item: &NewsItem) -> String;
    fn parse(&self, value: &Value) -> Result<Self::Output, ParseError>;
    /// Replace the item's scoring payload with a validated result.
    fn apply(&self, item: &mut NewsItem, output: Self::Output);
    /// Replace the item's scoring payload with the default-on-failure package.
    fn apply_default(&self, item: &mut NewsItem);
}

/// Single line, whitespace collapsed, at most `max_chars` characters.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars * 4));
    let mut count = 0usize;
    let mut prev_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() || ch.is_control() {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(ch);
            count += 1;
            prev_space = false;
        }
        if count >= max_chars {
            break;
        }
    }
    out.trim_end().to_string()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, ParseError> {
    value.as_object().ok_or(ParseError::NotAnObject)
}

/// Score in [0, 10]. Accepts numbers and numeric strings.
fn read_score(obj: &Map<String, Value>, field: &'static str) -> Result<f64, ParseError> {
    let v = obj.get(field).ok_or(ParseError::MissingField(field))?;
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or(ParseError::InvalidField(field))?;
    Ok(n.clamp(0.0, 10.0))
}

fn read_text(obj: &Map<String, Value>, field: &str, max_chars: usize) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(|s| sanitize_text(s, max_chars))
        .filter(|s| !s.is_empty())
}

fn item_json(item: &NewsItem, task: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("task".into(), json!(task));
    m.insert("title".into(), json!(item.title));
    m.insert("source".into(), json!(item.source));
    m.insert("published_at".into(), json!(item.published_at.to_rfc3339()));
    m.insert(
        "summary".into(),
        json!(truncate_chars(&item.summary, MAX_INPUT_SUMMARY_CHARS)),
    );
    if let Some(c) = item.category {
        m.insert("category_hint".into(), json!(c.as_str()));
    }
    m
}

// ------------------------------------------------------------
// Pass 1: category + coarse score
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseAssessment {
    pub category: Category,
    pub score: f64,
}

pub struct CoarsePass {
    prompt: String,
}

impl Default for CoarsePass {
    fn default() -> Self {
        Self::new()
    }
}

impl CoarsePass {
    pub fn new() -> Self {
        let prompt = "You screen news items for a daily digest. \
            Classify the item into exactly one category: \"finance\", \"tech\" or \"politics\" \
            (politics covers society and policy). \
            Then give a coarse newsworthiness score from 0 to 10. \
            Reply with a JSON object only: {\"category\": string, \"score\": number}."
            .to_string();
        Self { prompt }
    }
}

impl ScoringPass for CoarsePass {
    type Output = CoarseAssessment;

    fn name(&self) -> &'static str {
        "pass1"
    }

    fn system_prompt(&self) -> &str {
        &self.prompt
    }

    fn user_content(&self, item: &NewsItem) -> String {
        Value::Object(item_json(item, "coarse")).to_string()
    }

    fn parse(&self, value: &Value) -> Result<CoarseAssessment, ParseError> {
        let obj = as_object(value)?;
        let label = obj
            .get("category")
            .ok_or(ParseError::MissingField("category"))?
            .as_str()
            .ok_or(ParseError::InvalidField("category"))?;
        let category = Category::from_label(label).unwrap_or(Category::Politics);
        let score = read_score(obj, "score")?;
        Ok(CoarseAssessment { category, score })
    }

    fn apply(&self, item: &mut NewsItem, output: CoarseAssessment) {
        item.score = ScoreCard {
            category: Some(output.category),
            coarse_score: Some(output.score),
            ..ScoreCard::default()
        };
    }

    fn apply_default(&self, item: &mut NewsItem) {
        item.apply_failure();
    }
}

// ------------------------------------------------------------
// Pass 2: five dimensions + translation, summary, key points
// ------------------------------------------------------------

/// Validated Pass-2 response. Also the unit stored in the score cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepAssessment {
    pub dimensions: DimensionScores,
    pub translated_title: Option<String>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
}

pub struct DeepPass {
    criteria: ScoringCriteria,
    prompt: String,
}

impl DeepPass {
    pub fn new(criteria: ScoringCriteria, language: &str) -> Self {
        let prompt = format!(
            "You are the editor of a daily news digest. Score the item on five dimensions, \
             each from 0 to 10: importance (weight {:.2}), timeliness ({:.2}), \
             technical_depth ({:.2}), audience_breadth ({:.2}), practicality ({:.2}). \
             Also write the title translated into {language}, a summary of at most three \
             sentences in {language}, and up to {MAX_KEY_POINTS} short key points in {language}. \
             Reply with a JSON object only: {{\"scores\": {{\"importance\": number, \
             \"timeliness\": number, \"technical_depth\": number, \"audience_breadth\": number, \
             \"practicality\": number}}, \"translated_title\": string, \"summary\": string, \
             \"key_points\": [string]}}.",
            criteria.importance,
            criteria.timeliness,
            criteria.technical_depth,
            criteria.audience_breadth,
            criteria.practicality,
        );
        Self { criteria, prompt }
    }

    pub fn criteria(&self) -> &ScoringCriteria {
        &self.criteria
    }
}

impl ScoringPass for DeepPass {
    type Output = DeepAssessment;

    fn name(&self) -> &'static str {
        "pass2"
    }

    fn system_prompt(&self) -> &str {
        &self.prompt
    }

    fn user_content(&self, item: &NewsItem) -> String {
        let mut m = item_json(item, "deep");
        if let Some(c) = item.effective_category() {
            m.insert("category".into(), json!(c.as_str()));
        }
        Value::Object(m).to_string()
    }

    fn parse(&self, value: &Value) -> Result<DeepAssessment, ParseError> {
        let obj = as_object(value)?;
        // Some models flatten the dimensions to the top level.
        let scores = match obj.get("scores") {
            Some(Value::Object(s)) => s,
            Some(_) => return Err(ParseError::InvalidField("scores")),
            None => obj,
        };
        let dimensions = DimensionScores {
            importance: read_score(scores, "importance")?,
            timeliness: read_score(scores, "timeliness")?,
            technical_depth: read_score(scores, "technical_depth")?,
            audience_breadth: read_score(scores, "audience_breadth")?,
            practicality: read_score(scores, "practicality")?,
        };
        let key_points = match obj.get("key_points") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(a)) => a
                .iter()
                .filter_map(Value::as_str)
                .map(|s| sanitize_text(s, MAX_KEY_POINT_CHARS))
                .filter(|s| !s.is_empty())
                .take(MAX_KEY_POINTS)
                .collect(),
            Some(_) => return Err(ParseError::InvalidField("key_points")),
        };
        Ok(DeepAssessment {
            dimensions,
            translated_title: read_text(obj, "translated_title", MAX_TITLE_CHARS),
            summary: read_text(obj, "summary", MAX_SUMMARY_CHARS),
            key_points,
        })
    }

    fn apply(&self, item: &mut NewsItem, output: DeepAssessment) {
        let total = self.criteria.total(&output.dimensions);
        item.score = ScoreCard {
            category: item.effective_category().or(Some(Category::Politics)),
            coarse_score: item.score.coarse_score,
            dimensions: Some(output.dimensions),
            total_score: Some(total),
            translated_title: Some(
                output
                    .translated_title
                    .unwrap_or_else(|| item.title.clone()),
            ),
            summary: output.summary,
            key_points: output.key_points,
            defaulted: false,
        };
    }

    fn apply_default(&self, item: &mut NewsItem) {
        let coarse = item.score.coarse_score;
        item.apply_failure();
        if coarse.is_some() {
            item.score.coarse_score = coarse;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item() -> NewsItem {
        NewsItem::new(
            "Chipmaker unveils 2nm process",
            "https://example.com/chip",
            "Example Wire",
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
            "A long description ".repeat(40),
        )
        .with_category(Category::Tech)
    }

    #[test]
    fn sanitize_collapses_and_caps() {
        assert_eq!(sanitize_text("  a\n\n b\t c  ", 100), "a b c");
        assert_eq!(sanitize_text("科技新闻标题", 2), "科技");
    }

    #[test]
    fn user_content_is_json_with_truncated_summary() {
        let v: Value = serde_json::from_str(&CoarsePass::new().user_content(&item())).unwrap();
        assert_eq!(v["task"], "coarse");
        assert_eq!(v["category_hint"], "tech");
        assert_eq!(
            v["summary"].as_str().unwrap().chars().count(),
            MAX_INPUT_SUMMARY_CHARS
        );
    }

    #[test]
    fn coarse_parse_validates_fields() {
        let p = CoarsePass::new();
        let ok = p.parse(&json!({"category": "科技", "score": "7.5"})).unwrap();
        assert_eq!(ok.category, Category::Tech);
        assert_eq!(ok.score, 7.5);

        let unknown = p.parse(&json!({"category": "sports", "score": 12})).unwrap();
        assert_eq!(unknown.category, Category::Politics);
        assert_eq!(unknown.score, 10.0);

        assert_eq!(
            p.parse(&json!({"score": 3})),
            Err(ParseError::MissingField("category"))
        );
        assert_eq!(
            p.parse(&json!({"category": "tech", "score": "high"})),
            Err(ParseError::InvalidField("score"))
        );
        assert_eq!(p.parse(&json!([1])), Err(ParseError::NotAnObject));
    }

    #[test]
    fn deep_apply_recomputes_total_and_keeps_pass1_fields() {
        let p = DeepPass::new(ScoringCriteria::default(), "English");
        let mut it = item();
        CoarsePass::new().apply(
            &mut it,
            CoarseAssessment {
                category: Category::Tech,
                score: 6.5,
            },
        );

        let out = p
            .parse(&json!({
                "scores": {"importance": 8, "timeliness": 9, "technical_depth": 7,
                           "audience_breadth": 6, "practicality": 7},
                "total_score": 1.0,
                "summary": "Short\nsummary",
                "key_points": ["one", "", "two", 3]
            }))
            .unwrap();
        p.apply(&mut it, out);

        assert!((it.total_score() - 7.55).abs() < 1e-9);
        assert_eq!(it.score.category, Some(Category::Tech));
        assert_eq!(it.score.coarse_score, Some(6.5));
        assert_eq!(it.score.translated_title.as_deref(), Some(it.title.as_str()));
        assert_eq!(it.score.summary.as_deref(), Some("Short summary"));
        assert_eq!(it.score.key_points, vec!["one", "two"]);
        assert!(!it.score.defaulted);
    }

    #[test]
    fn deep_parse_requires_every_dimension() {
        let p = DeepPass::new(ScoringCriteria::default(), "English");
        let err = p
            .parse(&json!({"scores": {"importance": 8, "timeliness": 9}}))
            .unwrap_err();
        assert_eq!(err, ParseError::MissingField("technical_depth"));
        // Flattened layout is accepted.
        assert!(p
            .parse(&json!({"importance": 1, "timeliness": 2, "technical_depth": 3,
                           "audience_breadth": 4, "practicality": 5}))
            .is_ok());
    }

    #[test]
    fn deep_default_keeps_coarse_score() {
        let p = DeepPass::new(ScoringCriteria::default(), "English");
        let mut it = item();
        it.score.category = Some(Category::Tech);
        it.score.coarse_score = Some(6.2);
        p.apply_default(&mut it);
        assert!(it.score.defaulted);
        assert_eq!(it.score.coarse_score, Some(6.2));
        assert_eq!(it.total_score(), crate::model::DEFAULT_FAILURE_SCORE);
    }
}

//! history.rs: persisted run history: ids already published (so the next
//! run skips them) and a short log of per-run diagnostics.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HistorySettings;
use crate::model::NewsItem;
use crate::scoring::RunDiagnostics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub selected: usize,
    pub defaulted: usize,
    pub providers_used: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RunRecord {
    pub fn from_diagnostics(d: &RunDiagnostics, finished_at: DateTime<Utc>) -> Self {
        Self {
            finished_at,
            attempted: d.attempted,
            selected: d.selected,
            defaulted: d.defaulted,
            providers_used: d.providers_used.clone(),
            warnings: d.warnings.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    /// Oldest first.
    #[serde(default)]
    seen: VecDeque<String>,
    #[serde(default)]
    runs: VecDeque<RunRecord>,
}

#[derive(Debug)]
pub struct RunHistory {
    path: PathBuf,
    max_seen: usize,
    max_runs: usize,
    file: HistoryFile,
    index: HashSet<String>,
}

impl RunHistory {
    /// Missing file means empty history.
    pub fn load(settings: &HistorySettings) -> anyhow::Result<Self> {
        let file = match fs::read_to_string(&settings.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parse history {}", settings.path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HistoryFile::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read history {}", settings.path.display()))
            }
        };
        let mut h = Self {
            path: settings.path.clone(),
            max_seen: settings.max_seen.max(1),
            max_runs: settings.max_runs.max(1),
            index: file.seen.iter().cloned().collect(),
            file,
        };
        h.enforce_caps();
        Ok(h)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seen_count(&self) -> usize {
        self.file.seen.len()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn mark_seen<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            if self.index.insert(id.to_string()) {
                self.file.seen.push_back(id.to_string());
            }
        }
        self.enforce_caps();
    }

    pub fn filter_unseen(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        items.into_iter().filter(|it| !self.is_seen(&it.id)).collect()
    }

    pub fn record_run(&mut self, record: RunRecord) {
        self.file.runs.push_back(record);
        self.enforce_caps();
    }

    pub fn runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.file.runs.iter()
    }

    fn enforce_caps(&mut self) {
        while self.file.seen.len() > self.max_seen {
            if let Some(old) = self.file.seen.pop_front() {
                self.index.remove(&old);
            }
        }
        while self.file.runs.len() > self.max_runs {
            self.file.runs.pop_front();
        }
    }

    /// Write to a temp file next to the target, then rename over it.
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.file).context("serialize history")?;
        let mut f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(json.as_bytes())?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename into {}", self.path.display()))?;
        Ok(())
    }
}

//! Durable per-repository state: `panel.json`, `text/*.json`, `stats.json`,
//! `progress.json`, one directory per repository under the configured
//! cache root.
//!
//! A path-keyed atomic store: every write lands in a `.tmp` sibling
//! first, then is `fs::rename`d into place, so a crash mid-write never
//! leaves a half-written file where a reader expects a complete one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CoreError;
use crate::ingestion::progress::ProgressStore;
use crate::models::{MonthKey, MonthlyPanel, NormalizationStats, TextCorpus};

/// One directory per repository, keyed by a filesystem-safe slug of its
/// identity (`owner/name` → `owner__name`). Concurrent ingests of the
/// same repository are serialized by an advisory lock per slug; the
/// cache directory itself carries no OS-level lock.
pub struct RepoStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), locks: Mutex::new(HashMap::new()) }
    }

    pub fn slug(repo: &str) -> String {
        repo.chars().map(|c| if c == '/' { '_' } else { c }).collect::<String>().replace("__", "_")
    }

    fn repo_dir(&self, repo: &str) -> PathBuf {
        self.root.join(Self::slug(repo))
    }

    /// Advisory per-repository lock. Hold the guard for the duration of
    /// an ingest; readers (forecast/score) do not need it since reads of
    /// a fully-written `panel.json` are never torn (write-then-rename).
    pub fn lock(&self, repo: &str) -> Arc<Mutex<()>> {
        self.locks.lock().entry(repo.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn write_atomic(&self, path: &Path, json: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.write_atomic(path, &json)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        std::fs::read_to_string(path).ok().and_then(|s| serde_json::from_str(&s).ok())
    }

    pub fn save_panel(&self, repo: &str, panel: &MonthlyPanel) -> Result<(), CoreError> {
        if !panel.is_gap_free() {
            return Err(CoreError::IngestionPermanent {
                repo: repo.to_string(),
                reason: "panel axis has a gap: consecutive months must differ by exactly one"
                    .to_string(),
            });
        }
        let path = self.repo_dir(repo).join("panel.json");
        self.write_json(&path, panel).map_err(|e| CoreError::IngestionTransient {
            repo: repo.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load_panel(&self, repo: &str) -> Option<MonthlyPanel> {
        self.read_json(&self.repo_dir(repo).join("panel.json"))
    }

    pub fn save_static_docs(
        &self,
        repo: &str,
        docs: &crate::models::StaticDocs,
    ) -> std::io::Result<()> {
        let path = self.repo_dir(repo).join("text").join("static.json");
        self.write_json(&path, docs)
    }

    pub fn save_monthly_text(
        &self,
        repo: &str,
        month: MonthKey,
        text: &crate::models::MonthlyText,
    ) -> std::io::Result<()> {
        let path = self.repo_dir(repo).join("text").join(format!("{month}.json"));
        self.write_json(&path, text)
    }

    pub fn load_corpus(&self, repo: &str) -> TextCorpus {
        let dir = self.repo_dir(repo).join("text");
        let static_docs = self
            .read_json(&dir.join("static.json"))
            .unwrap_or_default();
        let mut monthly = BTreeMap::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                if stem == "static" {
                    continue;
                }
                if let Ok(month) = stem.parse::<MonthKey>() {
                    if let Some(text) = self.read_json(&path) {
                        monthly.insert(month, text);
                    }
                }
            }
        }
        TextCorpus { static_docs, monthly }
    }

    pub fn save_stats(&self, repo: &str, stats: &NormalizationStats) -> std::io::Result<()> {
        let path = self.repo_dir(repo).join("stats.json");
        self.write_json(&path, stats)
    }

    pub fn load_stats(&self, repo: &str) -> Option<NormalizationStats> {
        self.read_json(&self.repo_dir(repo).join("stats.json"))
    }

    pub fn progress(&self, repo: &str) -> ProgressStore {
        ProgressStore::load(self.repo_dir(repo).join("progress.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, MonthKey};

    #[test]
    fn scenario_f_axis_gap_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        let axis = vec![MonthKey::new(2023, 1), MonthKey::new(2023, 3)];
        let panel = MonthlyPanel::new(axis);
        let result = store.save_panel("octo/cat", &panel);
        assert!(matches!(result, Err(CoreError::IngestionPermanent { .. })));
    }

    #[test]
    fn panel_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = RepoStore::new(dir.path());
        let axis = vec![MonthKey::new(2023, 1), MonthKey::new(2023, 2)];
        let mut panel = MonthlyPanel::new(axis);
        panel.set(Channel::Stars, 0, Some(5.0));
        store.save_panel("octo/cat", &panel).unwrap();

        let loaded = store.load_panel("octo/cat").unwrap();
        assert_eq!(loaded.axis, panel.axis);
        assert_eq!(loaded.channel_series(Channel::Stars), panel.channel_series(Channel::Stars));
    }

    #[test]
    fn slug_replaces_path_separators() {
        assert_eq!(RepoStore::slug("octo/cat"), "octo_cat");
    }
}

//! Resumable-ingestion bookkeeping: the `(repo, month, stream)`
//! completed-triples set backing `progress.json`.
//!
//! Grounded on `backtest_v2/artifact_store.rs`'s atomic write-then-rename
//! discipline, adapted to a small append-only set file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::MonthKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Metrics,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub repo: String,
    pub month: MonthKey,
    pub stream: Stream,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProgressFile {
    completed: BTreeSet<Triple>,
    failed: BTreeSet<Triple>,
}

/// In-memory set, flushed to `progress.json` on `save`. `load` reads the
/// file back (or starts empty if absent) so a rerun skips completed work.
pub struct ProgressStore {
    path: PathBuf,
    state: ProgressFile,
}

impl ProgressStore {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Self { path, state }
    }

    pub fn mark_done(&mut self, repo: &str, month: MonthKey, stream: Stream) {
        let t = Triple { repo: repo.to_string(), month, stream };
        self.state.failed.remove(&t);
        self.state.completed.insert(t);
    }

    pub fn mark_failed(&mut self, repo: &str, month: MonthKey, stream: Stream) {
        self.state.failed.insert(Triple { repo: repo.to_string(), month, stream });
    }

    pub fn is_done(&self, repo: &str, month: MonthKey, stream: Stream) -> bool {
        self.state.completed.contains(&Triple { repo: repo.to_string(), month, stream })
    }

    pub fn save(&self) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_done_then_is_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut store = ProgressStore::load(&path);
        let m = MonthKey::new(2023, 1);
        assert!(!store.is_done("octo/cat", m, Stream::Metrics));
        store.mark_done("octo/cat", m, Stream::Metrics);
        assert!(store.is_done("octo/cat", m, Stream::Metrics));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let m = MonthKey::new(2023, 2);
        {
            let mut store = ProgressStore::load(&path);
            store.mark_done("octo/cat", m, Stream::Text);
            store.save().unwrap();
        }
        let store = ProgressStore::load(&path);
        assert!(store.is_done("octo/cat", m, Stream::Text));
    }

    #[test]
    fn failed_mark_cleared_by_mark_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut store = ProgressStore::load(&path);
        let m = MonthKey::new(2023, 3);
        store.mark_failed("octo/cat", m, Stream::Metrics);
        store.mark_done("octo/cat", m, Stream::Metrics);
        assert!(!store.state.failed.contains(&Triple {
            repo: "octo/cat".to_string(),
            month: m,
            stream: Stream::Metrics,
        }));
    }
}

use std::path::PathBuf;

use anyhow::Context;
use unidl_core::fs_paths::AppPaths;
use unidl_core::models::history::{push_entry, HistoryEntry};

/// Recently submitted downloads, persisted as `history.json`.
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
}

impl HistoryStore {
    pub fn new(paths: &dyn AppPaths, limit: usize) -> Self {
        Self {
            path: paths.history_file(),
            limit,
        }
    }

    pub async fn load(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        match serde_json::from_str(&json) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!("Discarding unreadable history: {}", e);
                Ok(Vec::new())
            }
        }
    }

    pub async fn record(&self, mut entry: HistoryEntry) -> anyhow::Result<Vec<HistoryEntry>> {
        let mut entries = self.load().await?;
        if let Some(max) = entries.iter().map(|e| e.id).max() {
            if entry.id <= max && entries.iter().any(|e| e.id == entry.id) {
                entry.id = max + 1;
            }
        }
        push_entry(&mut entries, entry, self.limit);
        self.save(&entries).await?;
        Ok(entries)
    }

    pub async fn remove(&self, id: i64) -> anyhow::Result<bool> {
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    async fn save(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("cannot write {}", self.path.display()))?;
        Ok(())
    }
}

//! Task history persisted as a JSON array on disk.
//!
//! Every entry is `{timestamp, user, agent_plan, results}`. A missing or
//! corrupt file reads as an empty history.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use sdk::EngineError;

use crate::tools::filesystem::write_atomic;

/// Entries kept on disk; older ones are dropped on append
const MAX_STORED_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// ISO-8601 UTC, e.g. `2026-01-02T03:04:05.123456Z`
    pub timestamp: String,
    pub user: String,
    pub agent_plan: Value,
    pub results: Value,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The trailing `limit` entries, oldest first.
    pub async fn load(&self, limit: usize) -> Vec<HistoryEntry> {
        let mut entries = self.load_all().await;
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
        entries
    }

    async fn load_all(&self) -> Vec<HistoryEntry> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Could not read history {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring corrupt history {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Append one entry and write the whole array back.
    pub async fn append(
        &self,
        user: &str,
        agent_plan: Value,
        results: Value,
    ) -> Result<HistoryEntry, EngineError> {
        let entry = HistoryEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            user: user.to_string(),
            agent_plan,
            results,
        };

        let mut entries = self.load_all().await;
        entries.push(entry.clone());
        let excess = entries.len().saturating_sub(MAX_STORED_ENTRIES);
        entries.drain(..excess);

        let body = serde_json::to_string_pretty(&entries)
            .map_err(|e| EngineError::History(e.to_string()))?;
        write_atomic(&self.path, &body)
            .await
            .map_err(|e| EngineError::History(format!("{}: {e}", self.path.display())))?;

        debug!(entries = entries.len(), "History appended");
        Ok(entry)
    }
}

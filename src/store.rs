use crate::error::{Result, SpeedtestError};
use crate::types::MeasurementResult;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// One persisted measurement. (timestamp, host) identifies a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub timestamp: DateTime<FixedOffset>,
    pub host: String,
    pub ping: f64,
    pub download_speed: u64,
    pub search: String,
}

impl StoredResult {
    /// Only successful measurements are stored.
    fn from_result(result: &MeasurementResult) -> Option<Self> {
        if !result.is_success() {
            return None;
        }
        Some(Self {
            timestamp: result.timestamp.into(),
            host: result.host.clone(),
            ping: result.latency.millis()?,
            download_speed: result.download_kbps?,
            search: result.label.clone(),
        })
    }

    fn key(&self) -> (DateTime<FixedOffset>, String) {
        (self.timestamp, self.host.clone())
    }
}

/// 结果文件: 每行一个 JSON 记录, 只追加
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub async fn load(&self) -> Result<Vec<StoredResult>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SpeedtestError::from))
            .collect()
    }

    /// Appends the successful results not already stored; returns how many were written.
    pub async fn append(&self, results: &[MeasurementResult]) -> Result<usize> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut seen: HashSet<_> = self.load().await?.iter().map(StoredResult::key).collect();

        let mut lines = String::new();
        let mut written = 0;
        for record in results.iter().filter_map(StoredResult::from_result) {
            if !seen.insert(record.key()) {
                debug!("{} at {} already stored", record.host, record.timestamp);
                continue;
            }
            lines.push_str(&serde_json::to_string(&record)?);
            lines.push('\n');
            written += 1;
        }

        if written > 0 {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(lines.as_bytes()).await?;
            file.flush().await?;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Latency, Target};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_skips_failures_and_duplicates() -> Result<()> {
        let dir = tempdir()?;
        let store = ResultStore::new(&dir.path().join("out").join("results.jsonl"));

        let ok = MeasurementResult::success(&Target::explicit("a:8080"), 12.5, 42_000);
        let failed = MeasurementResult::failure(&Target::explicit("b:8080"), Latency::Unreachable);

        assert_eq!(store.append(&[ok.clone(), failed]).await?, 1);
        // same (timestamp, host) again is not written twice
        assert_eq!(store.append(&[ok.clone()]).await?, 0);

        let stored = store.load().await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].host, "a:8080");
        assert_eq!(stored[0].ping, 12.5);
        assert_eq!(stored[0].download_speed, 42_000);
        assert_eq!(stored[0].search, "a:8080");
        assert_eq!(stored[0].timestamp, DateTime::<FixedOffset>::from(ok.timestamp));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = ResultStore::new(&dir.path().join("none.jsonl"));
        assert!(store.load().await?.is_empty());
        Ok(())
    }
}

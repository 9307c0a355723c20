use crate::error::{Result, SpeedtestError};
use crate::traits::DirectorySource;
use crate::types::ServerCandidate;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

/// Raw directory entry. The service is untrusted: every field may be missing, and an
/// entry without a host is skipped like a non-viable one.
#[derive(Debug, Deserialize)]
struct ServerRecord {
    #[serde(default)]
    cc: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    https_functional: Option<Flag>,
    #[serde(default)]
    sponsor: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// `https_functional` shows up as 0/1 or as a boolean depending on the endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i == 1,
        }
    }
}

impl ServerRecord {
    fn into_candidate(self, term: &str) -> ServerCandidate {
        let host = self.host.unwrap_or_default().trim().to_string();
        ServerCandidate {
            viable: !host.is_empty() && self.https_functional.is_some_and(|f| f.is_set()),
            host,
            sponsor: self.sponsor.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            country_code: self.cc.unwrap_or_default(),
            country: self.country.unwrap_or_default(),
            distance: self.distance.unwrap_or_default(),
            term: Some(term.to_string()),
        }
    }
}

/// 服务器目录: 查询, 过滤不可用主机, 去重
pub struct ServerDirectory<S> {
    source: S,
}

impl<S: DirectorySource> ServerDirectory<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Viable servers matching `term`, each identity once, in directory order.
    ///
    /// Request and parse failures surface as `DirectoryUnavailable`; nothing is retried here.
    pub async fn fetch(&self, term: &str, limit: usize) -> Result<Vec<ServerCandidate>> {
        let body = self.source.query(term, limit).await.map_err(|e| {
            SpeedtestError::DirectoryUnavailable(format!("search '{}': {}", term, e))
        })?;

        let records: Vec<ServerRecord> = serde_json::from_str(&body).map_err(|e| {
            SpeedtestError::DirectoryUnavailable(format!("bad response for '{}': {}", term, e))
        })?;

        debug!("Directory returned {} entries for '{}'", records.len(), term);

        Ok(select_viable(records, term))
    }
}

fn select_viable(records: Vec<ServerRecord>, term: &str) -> Vec<ServerCandidate> {
    let mut seen = HashSet::new();

    records
        .into_iter()
        .map(|r| r.into_candidate(term))
        .filter(|c| c.viable)
        .filter(|c| seen.insert(c.key()))
        .collect()
}

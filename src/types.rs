use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

/// Identity of a directory entry. Two entries with the same key are the same server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    pub host: String,
    pub sponsor: String,
    pub name: String,
}

/// 目录服务返回的一台候选服务器
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCandidate {
    pub host: String,    // 例如: "speedtest.example.net:8080"
    pub sponsor: String, // 例如: "Example ISP"
    pub name: String,    // 例如: "Berlin"
    pub country_code: String,
    pub country: String,
    pub distance: f64,
    pub viable: bool,
    /// Search term that produced this entry.
    pub term: Option<String>,
}

impl ServerCandidate {
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            host: self.host.clone(),
            sponsor: self.sponsor.clone(),
            name: self.name.clone(),
        }
    }

    /// Label used in results: the search term if there was one, else the display name.
    pub fn label(&self) -> String {
        match self.term.as_deref() {
            Some(term) if !term.is_empty() => term.to_string(),
            _ if !self.name.is_empty() => self.name.clone(),
            _ => self.host.clone(),
        }
    }
}

/// Outcome of a latency probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Latency {
    Measured(f64),
    Unreachable,
}

impl Latency {
    pub fn millis(&self) -> Option<f64> {
        match self {
            Latency::Measured(ms) => Some(*ms),
            Latency::Unreachable => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Latency::Measured(_))
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Latency::Measured(ms) => write!(f, "{:6.1}", ms),
            Latency::Unreachable => write!(f, "{:>6}", "ERROR"),
        }
    }
}

/// A candidate that survived ranking, with its coarse latency.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: ServerCandidate,
    pub latency_ms: f64,
}

impl fmt::Display for RankedCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<36} ({:6.1} ms): {}",
            self.candidate.sponsor, self.latency_ms, self.candidate.host
        )
    }
}

/// A host to measure, either picked by ranking or given explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub host: String,
    pub label: String,
}

impl Target {
    pub fn explicit(host: &str) -> Self {
        Self {
            host: host.to_string(),
            label: host.to_string(),
        }
    }
}

impl From<&RankedCandidate> for Target {
    fn from(ranked: &RankedCandidate) -> Self {
        Self {
            host: ranked.candidate.host.clone(),
            label: ranked.candidate.label(),
        }
    }
}

/// 单台主机的测速结果
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementResult {
    pub timestamp: DateTime<Local>,
    pub host: String,
    pub latency: Latency,
    /// 下载速度 (kbit/s), None 表示测速失败
    pub download_kbps: Option<u64>,
    pub label: String,
}

impl MeasurementResult {
    pub fn success(target: &Target, latency_ms: f64, download_kbps: u64) -> Self {
        Self {
            timestamp: Local::now(),
            host: target.host.clone(),
            latency: Latency::Measured(latency_ms),
            download_kbps: Some(download_kbps),
            label: target.label.clone(),
        }
    }

    pub fn failure(target: &Target, latency: Latency) -> Self {
        Self {
            timestamp: Local::now(),
            host: target.host.clone(),
            latency,
            download_kbps: None,
            label: target.label.clone(),
        }
    }

    /// A result counts only with a real latency and a non-zero bitrate.
    pub fn is_success(&self) -> bool {
        self.latency.is_reachable() && self.download_kbps.is_some_and(|kbps| kbps > 0)
    }
}

impl fmt::Display for MeasurementResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_success(), self.latency, self.download_kbps) {
            (true, Latency::Measured(ms), Some(kbps)) => {
                write!(f, "{:6.1} ms | {:8} kbit | {}", ms, kbps, self.host)
            }
            _ => write!(f, "{:>6} ms | {:>8} kbit | {}", "ERROR", "ERROR", self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(host: &str, name: &str, term: Option<&str>) -> ServerCandidate {
        ServerCandidate {
            host: host.to_string(),
            sponsor: "Sponsor".to_string(),
            name: name.to_string(),
            country_code: "DE".to_string(),
            country: "Germany".to_string(),
            distance: 10.0,
            viable: true,
            term: term.map(str::to_string),
        }
    }

    #[test]
    fn test_key_ignores_distance() {
        let a = candidate("a:8080", "Berlin", None);
        let mut b = a.clone();
        b.distance = 99.0;
        b.term = Some("berlin".to_string());
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_label_prefers_term() {
        assert_eq!(candidate("a:8080", "Berlin", Some("ber")).label(), "ber");
        assert_eq!(candidate("a:8080", "Berlin", Some("")).label(), "Berlin");
        assert_eq!(candidate("a:8080", "", None).label(), "a:8080");
    }

    #[test]
    fn test_failed_result_renders_error() {
        let target = Target::explicit("a:8080");
        let failed = MeasurementResult::failure(&target, Latency::Unreachable);
        assert!(!failed.is_success());
        assert_eq!(failed.to_string(), " ERROR ms |    ERROR kbit | a:8080");

        let ok = MeasurementResult::success(&target, 12.34, 9000);
        assert!(ok.is_success());
        assert_eq!(ok.to_string(), "  12.3 ms |     9000 kbit | a:8080");
    }

    #[test]
    fn test_zero_throughput_is_not_success() {
        let target = Target::explicit("a:8080");
        let zero = MeasurementResult::success(&target, 10.0, 0);
        assert!(!zero.is_success());
        assert!(zero.to_string().contains("ERROR"));
    }
}

use crate::error::{Result, SpeedtestError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_DIRECTORY_URL: &str = "https://www.speedtest.net/api/js/servers";

/// Run settings. Immutable once loaded; every component borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub download_time_ms: u64,
    pub download_connections: usize,
    pub buffer_size: usize,
    pub ping_count: usize,
    pub ping_time_limit_ms: u64,
    pub ping_timeout_ms: u64,
    /// Bound on opening download streams and on the candidate download check.
    pub open_timeout_ms: u64,
    pub servers: Vec<String>,
    pub search: String,
    pub candidate_count: usize,
    pub candidate_ping_max: usize,
    pub candidate_ping_time_limit_ms: u64,
    pub candidate_tests: usize,
    pub verify_candidates: bool,
    pub debug: bool,
    pub verbose: bool,
    pub interactive: bool,
    pub directory_url: String,
    pub download_size: u64,
    pub sample_interval_ms: u64,
    pub results_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_time_ms: 5000,
            download_connections: 4,
            buffer_size: 4096,
            ping_count: 20,
            ping_time_limit_ms: 2000,
            ping_timeout_ms: 1000,
            open_timeout_ms: 10_000,
            servers: Vec::new(),
            search: String::new(),
            candidate_count: 5,
            candidate_ping_max: 3,
            candidate_ping_time_limit_ms: 750,
            candidate_tests: 1,
            verify_candidates: true,
            debug: false,
            verbose: false,
            interactive: true,
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            download_size: 25_000_000,
            sample_interval_ms: 50,
            results_file: None,
        }
    }
}

impl Settings {
    /// Load settings from a file.
    /// Strategy:
    /// 1. Explicit path, if given (must exist)
    /// 2. ./speedtest.toml, ./speedtest.json, then ~/.config/speedtest/config.toml
    /// 3. Built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => candidate_paths().into_iter().find(|p| p.exists()),
        };

        match path {
            Some(path) => {
                debug!("Loading settings from {:?}", path);
                let content = fs::read_to_string(&path)?;
                Self::parse(&content, &path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parses by extension: `.json` is JSON, anything else TOML.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(toml::from_str(content)?)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("download_time_ms", self.download_time_ms),
            ("download_connections", self.download_connections as u64),
            ("buffer_size", self.buffer_size as u64),
            ("ping_count", self.ping_count as u64),
            ("ping_time_limit_ms", self.ping_time_limit_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("open_timeout_ms", self.open_timeout_ms),
            ("candidate_count", self.candidate_count as u64),
            ("candidate_ping_max", self.candidate_ping_max as u64),
            ("candidate_ping_time_limit_ms", self.candidate_ping_time_limit_ms),
            ("candidate_tests", self.candidate_tests as u64),
            ("download_size", self.download_size),
            ("sample_interval_ms", self.sample_interval_ms),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(SpeedtestError::ConfigurationInvalid(format!(
                "{} must be greater than zero",
                name
            )));
        }

        if self.directory_url.trim().is_empty() {
            return Err(SpeedtestError::ConfigurationInvalid(
                "directory_url must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Comma-separated search terms. An empty term asks the directory for nearby servers.
    pub fn search_terms(&self) -> Vec<String> {
        self.search.split(',').map(|t| t.trim().to_string()).collect()
    }

    pub fn download_time(&self) -> Duration {
        Duration::from_millis(self.download_time_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("speedtest.toml"),
        PathBuf::from("speedtest.json"),
    ];
    if let Some(proj_dirs) = ProjectDirs::from("", "", "speedtest") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }
    paths
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Settings:")?;
        writeln!(f, "{:<28}: {}", "download_time_ms", self.download_time_ms)?;
        writeln!(f, "{:<28}: {}", "download_connections", self.download_connections)?;
        writeln!(f, "{:<28}: {}", "buffer_size", self.buffer_size)?;
        writeln!(f, "{:<28}: {}", "ping_count", self.ping_count)?;
        writeln!(f, "{:<28}: {}", "ping_time_limit_ms", self.ping_time_limit_ms)?;
        writeln!(f, "{:<28}: {}", "open_timeout_ms", self.open_timeout_ms)?;
        writeln!(f, "{:<28}: {}", "candidate_count", self.candidate_count)?;
        writeln!(f, "{:<28}: {}", "candidate_ping_max", self.candidate_ping_max)?;
        writeln!(f, "{:<28}: {}", "candidate_tests", self.candidate_tests)?;
        writeln!(f, "{:<28}: {}", "verify_candidates", self.verify_candidates)?;
        writeln!(f, "{:<28}: {}", "debug", self.debug)?;
        writeln!(f, "{:<28}: {}", "verbose", self.verbose)?;
        writeln!(f, "{:<28}: {}", "interactive", self.interactive)?;
        writeln!(f, "{:<28}: \"{}\"", "search", self.search)?;
        writeln!(f, "{:<28}: [{}]", "servers", self.servers.join(", "))
    }
}

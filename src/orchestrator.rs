//! Drives one measurement pass: resolve hosts, then probe latency and measure
//! throughput for each host in turn. Per-host failures are recorded, never fatal.

use crate::config::Settings;
use crate::directory::ServerDirectory;
use crate::latency::LatencyProbe;
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::ranker::{self, CandidateRanker};
use crate::throughput::ThroughputMeasurer;
use crate::traits::{DirectorySource, DownloadTransport, Pinger};
use crate::types::{Latency, MeasurementResult, Target};
use tracing::{debug, info, warn};

// 目录请求比候选数多取几个, 以抵消不可用与重复的条目
const DIRECTORY_SLACK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// No usable host; nothing was measured.
    Failed,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub results: Vec<MeasurementResult>,
}

impl RunReport {
    /// True when at least one host produced a usable measurement.
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Completed && self.results.iter().any(|r| r.is_success())
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

pub struct Orchestrator<'a, D, P, T> {
    settings: &'a Settings,
    directory: ServerDirectory<D>,
    probe: LatencyProbe<P>,
    transport: T,
}

impl<'a, D, P, T> Orchestrator<'a, D, P, T>
where
    D: DirectorySource,
    P: Pinger,
    T: DownloadTransport,
{
    pub fn new(settings: &'a Settings, directory: D, pinger: P, transport: T) -> Self {
        Self {
            settings,
            directory: ServerDirectory::new(directory),
            probe: LatencyProbe::new(pinger, settings.ping_timeout()),
            transport,
        }
    }

    pub async fn run(&self, progress: &dyn ProgressCallback) -> RunReport {
        let targets = self.resolve_hosts(progress).await;

        if targets.is_empty() {
            warn!("No usable server found");
            return RunReport {
                outcome: Outcome::Failed,
                results: Vec::new(),
            };
        }

        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            let result = self.measure_host(target, progress).await;
            progress.on_progress(ProgressEvent::HostCompleted(result.clone()));
            results.push(result);
        }

        RunReport {
            outcome: Outcome::Completed,
            results,
        }
    }

    /// Explicit servers win; otherwise each search term is looked up and ranked.
    /// Hosts are concatenated in term order.
    async fn resolve_hosts(&self, progress: &dyn ProgressCallback) -> Vec<Target> {
        if !self.settings.servers.is_empty() {
            return self
                .settings
                .servers
                .iter()
                .map(|host| Target::explicit(host))
                .collect();
        }

        let ranker = CandidateRanker::new(&self.probe, &self.transport, self.settings);
        let mut targets = Vec::new();

        for term in self.settings.search_terms() {
            let limit = self.settings.candidate_count + DIRECTORY_SLACK;
            let candidates = match self.directory.fetch(&term, limit).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };

            let ranked = ranker
                .rank(
                    &candidates,
                    self.settings.candidate_ping_max,
                    self.settings.candidate_count,
                )
                .await;
            progress.on_progress(ProgressEvent::CandidatesRanked {
                term: term.clone(),
                candidates: ranked.clone(),
            });

            let selected = ranker::select(&ranked, self.settings.candidate_tests);
            if selected.is_empty() {
                warn!("Could not find server: {:?}", term);
                continue;
            }

            debug!(
                "Auto server(s) for {:?}: {}",
                term,
                selected
                    .iter()
                    .map(|t| t.host.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            targets.extend(selected);
        }

        targets
    }

    async fn measure_host(
        &self,
        target: &Target,
        progress: &dyn ProgressCallback,
    ) -> MeasurementResult {
        let latency = self
            .probe
            .measure(
                &target.host,
                self.settings.ping_count,
                self.settings.ping_time_limit_ms,
            )
            .await;

        let Latency::Measured(latency_ms) = latency else {
            warn!("{} is unreachable", target.host);
            return MeasurementResult::failure(target, latency);
        };

        progress.on_progress(ProgressEvent::HostStarted {
            host: target.host.clone(),
            latency_ms,
        });

        let measurer = ThroughputMeasurer::new(&self.transport, self.settings);
        match measurer.measure(&target.host, progress).await {
            Ok(report) => {
                info!(
                    "{}: {:.1} ms, {} kbit/s ({} bytes in {:?})",
                    target.host, latency_ms, report.kbps, report.total_bytes, report.elapsed
                );
                MeasurementResult::success(target, latency_ms, report.kbps)
            }
            Err(e) => {
                warn!("{}", e);
                MeasurementResult::failure(target, latency)
            }
        }
    }
}

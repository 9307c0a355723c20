use crate::config::Settings;
use crate::latency::LatencyProbe;
use crate::throughput::download_url;
use crate::traits::{DownloadTransport, Pinger};
use crate::types::{Latency, RankedCandidate, ServerCandidate, Target};
use tokio::time;
use tracing::debug;

/// Coarse latency ranking of directory results.
pub struct CandidateRanker<'a, P, T> {
    probe: &'a LatencyProbe<P>,
    transport: &'a T,
    settings: &'a Settings,
}

impl<'a, P: Pinger, T: DownloadTransport> CandidateRanker<'a, P, T> {
    pub fn new(probe: &'a LatencyProbe<P>, transport: &'a T, settings: &'a Settings) -> Self {
        Self {
            probe,
            transport,
            settings,
        }
    }

    /// 并发探测前 `cap` 个候选, 按延迟从小到大排序, 剔除不可达的
    ///
    /// Ties keep directory order.
    pub async fn rank(
        &self,
        candidates: &[ServerCandidate],
        probe_count: usize,
        cap: usize,
    ) -> Vec<RankedCandidate> {
        let tasks = candidates
            .iter()
            .take(cap)
            .map(|candidate| async move {
                let latency = self.check_candidate(candidate, probe_count).await;
                (candidate, latency)
            });

        let probed = futures::future::join_all(tasks).await;

        let mut ranked: Vec<RankedCandidate> = probed
            .into_iter()
            .filter_map(|(candidate, latency)| {
                latency.millis().map(|latency_ms| RankedCandidate {
                    candidate: candidate.clone(),
                    latency_ms,
                })
            })
            .collect();

        ranked.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));
        ranked
    }

    async fn check_candidate(&self, candidate: &ServerCandidate, probe_count: usize) -> Latency {
        let latency = self
            .probe
            .measure(
                &candidate.host,
                probe_count,
                self.settings.candidate_ping_time_limit_ms,
            )
            .await;

        if !latency.is_reachable() || !self.settings.verify_candidates {
            return latency;
        }

        // hosts that answer pings but do not serve downloads are useless
        let url = download_url(&candidate.host, self.settings.download_size);
        let timeout = self.settings.open_timeout();
        match time::timeout(timeout, self.transport.check(&url)).await {
            Ok(Ok(())) => latency,
            Ok(Err(e)) => {
                debug!("{} failed verification: {}", candidate.host, e);
                Latency::Unreachable
            }
            Err(_) => {
                debug!("{} did not answer verification within {:?}", candidate.host, timeout);
                Latency::Unreachable
            }
        }
    }
}

/// The first `count` ranked candidates, as measurement targets.
pub fn select(ranked: &[RankedCandidate], count: usize) -> Vec<Target> {
    ranked.iter().take(count).map(Target::from).collect()
}

use crate::stats;
use crate::traits::Pinger;
use crate::types::Latency;
use std::time::Duration;
use tracing::debug;

/// Adaptive probe count: at most `max_probes`, and no more than fit in `budget_ms`
/// at the observed round-trip time. Never less than one.
pub fn adaptive_probe_count(max_probes: usize, budget_ms: u64, round_trip_ms: u64) -> usize {
    let fits = budget_ms / round_trip_ms.max(1);
    (max_probes as u64).min(fits).max(1) as usize
}

/// Whole milliseconds. A reply under 1 ms counts as 1 ms; 0 is reserved for failed probes.
fn round_trip_ms(rtt: Duration) -> u64 {
    (rtt.as_millis() as u64).max(1)
}

/// 延迟探测: 先发一个可达性探测, 再按时间预算发送后续探测
pub struct LatencyProbe<P> {
    pinger: P,
    timeout: Duration,
}

impl<P: Pinger> LatencyProbe<P> {
    pub fn new(pinger: P, timeout: Duration) -> Self {
        Self { pinger, timeout }
    }

    pub fn pinger(&self) -> &P {
        &self.pinger
    }

    /// Mean round-trip time of `host` after dropping upper outliers.
    ///
    /// A failed first probe returns `Unreachable` without sending anything else.
    pub async fn measure(&self, host: &str, max_probes: usize, budget_ms: u64) -> Latency {
        let Some(initial) = self.pinger.ping(host, self.timeout).await else {
            debug!("ping error: {}", host);
            return Latency::Unreachable;
        };

        let first = round_trip_ms(initial);
        let count = adaptive_probe_count(max_probes, budget_ms, first);

        let mut samples = Vec::with_capacity(count);
        samples.push(first);
        for _ in 1..count {
            let rtt = self.pinger.ping(host, self.timeout).await;
            // timeouts are kept as 0 so the filter drops them
            samples.push(rtt.map(round_trip_ms).unwrap_or(0));
        }

        log_samples(host, "raw", &samples);
        let filtered = stats::remove_upper_outliers(&samples);
        log_samples(host, "filtered", &filtered);

        // the first sample is at least 1 ms and the smallest positive sample never exceeds
        // the mean, so the filter always keeps something
        Latency::Measured(stats::mean(&filtered))
    }
}

fn log_samples(host: &str, stage: &str, samples: &[u64]) {
    debug!(
        "{} {}: avg: {:.3} min: {} max: {} sd: {:.2} var: {:.2} count: {} data: {:?}",
        host,
        stage,
        stats::mean(samples),
        stats::min(samples),
        stats::max(samples),
        stats::std_dev(samples),
        stats::variance(samples),
        samples.len(),
        samples
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPinger;

    fn probe(pinger: MockPinger) -> LatencyProbe<MockPinger> {
        LatencyProbe::new(pinger, Duration::from_millis(1000))
    }

    #[test]
    fn test_adaptive_probe_count() {
        assert_eq!(adaptive_probe_count(20, 2000, 500), 4);
        assert_eq!(adaptive_probe_count(20, 2000, 10), 20);
        assert_eq!(adaptive_probe_count(3, 750, 1000), 1);
        // zero round trip must not divide by zero
        assert_eq!(adaptive_probe_count(5, 2000, 0), 5);
    }

    #[tokio::test]
    async fn test_unreachable_sends_no_more_probes() {
        let probe = probe(MockPinger::new().host("dead:8080", &[None]));
        let latency = probe.measure("dead:8080", 20, 2000).await;

        assert_eq!(latency, Latency::Unreachable);
        assert_eq!(probe.pinger().calls("dead:8080"), 1);
    }

    #[tokio::test]
    async fn test_slow_host_gets_fewer_probes() {
        let probe = probe(MockPinger::new().host("slow:8080", &[Some(500)]));
        let latency = probe.measure("slow:8080", 20, 2000).await;

        assert_eq!(latency, Latency::Measured(500.0));
        // 2000 / 500 = 4 samples, the first from the reachability probe
        assert_eq!(probe.pinger().calls("slow:8080"), 4);
    }

    #[tokio::test]
    async fn test_spike_is_excluded() {
        let replies = [
            Some(20),
            Some(21),
            Some(19),
            Some(20),
            Some(22),
            Some(18),
            Some(250),
        ];
        let probe = probe(MockPinger::new().host("h:8080", &replies));
        let latency = probe.measure("h:8080", 7, 2000).await;

        assert_eq!(latency, Latency::Measured(20.0));
        assert_eq!(probe.pinger().calls("h:8080"), 7);
    }

    #[tokio::test]
    async fn test_lost_follow_up_probes_are_ignored() {
        let probe = probe(MockPinger::new().host("h:8080", &[Some(30), None, None, Some(30)]));
        let latency = probe.measure("h:8080", 4, 2000).await;

        assert_eq!(latency, Latency::Measured(30.0));
    }

    #[tokio::test]
    async fn test_mostly_lost_probes_still_measure() {
        let replies = [Some(400), None, None, None, None, Some(900)];
        let probe = probe(MockPinger::new().host("h:8080", &replies));
        let latency = probe.measure("h:8080", 6, 2400).await;

        // 400 and 900 average 650 with sd ~354; 900 is within one sd and stays
        assert_eq!(latency, Latency::Measured(650.0));
        assert_eq!(probe.pinger().calls("h:8080"), 6);
    }

    #[tokio::test]
    async fn test_sub_millisecond_reply_is_reachable() {
        let probe = probe(MockPinger::new().host_micros("local", 300));
        let latency = probe.measure("local", 3, 2000).await;

        assert_eq!(latency, Latency::Measured(1.0));
    }
}

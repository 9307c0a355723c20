use crate::types::{MeasurementResult, RankedCandidate};
use std::time::Duration;

/// Events the measurement pipeline reports while it runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Ranking finished for one search term.
    CandidatesRanked {
        term: String,
        candidates: Vec<RankedCandidate>,
    },
    /// Latency is known, the throughput test is about to start.
    HostStarted { host: String, latency_ms: f64 },
    /// Running bitrate, sampled while the throughput test is in progress.
    Throughput {
        host: String,
        elapsed: Duration,
        kbps: u64,
    },
    /// Final outcome for one host, successful or not.
    HostCompleted(MeasurementResult),
}

/// Receives progress events. Implemented for any `Fn(ProgressEvent)` closure.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct Silent;

impl ProgressCallback for Silent {
    fn on_progress(&self, _event: ProgressEvent) {}
}

//! Multi-stream download throughput.
//!
//! A fixed number of slots each keep one download open for the whole test window. A slot
//! whose stream ends or errors reopens it at once with a fresh cache-busting URL. The clock
//! starts once every initial stream is open and the window closes with a single
//! cancellation signal shared by all slots.

use crate::config::Settings;
use crate::error::{Result, SpeedtestError};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::traits::{DownloadStream, DownloadTransport};
use futures::future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Download URL with a fresh cache-busting token.
pub fn download_url(host: &str, size: u64) -> String {
    format!(
        "https://{}/download?nocache={}&size={}",
        host,
        Uuid::new_v4(),
        size
    )
}

/// Outcome of one throughput test.
#[derive(Debug, Clone)]
pub struct ThroughputReport {
    pub bytes_per_slot: Vec<u64>,
    pub reopens_per_slot: Vec<u64>,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub kbps: u64,
}

/// kbit/s from bytes and elapsed milliseconds (bits per millisecond is kbit/s).
pub fn kbps(total_bytes: u64, elapsed: Duration) -> u64 {
    let ms = (elapsed.as_millis() as u64).max(1);
    total_bytes * 8 / ms
}

struct SlotExit {
    reopens: u64,
    error: Option<SpeedtestError>,
}

pub struct ThroughputMeasurer<'a, T> {
    transport: &'a T,
    settings: &'a Settings,
}

impl<'a, T: DownloadTransport> ThroughputMeasurer<'a, T> {
    pub fn new(transport: &'a T, settings: &'a Settings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub async fn measure(
        &self,
        host: &str,
        progress: &dyn ProgressCallback,
    ) -> Result<ThroughputReport> {
        self.measure_until(host, progress, CancellationToken::new())
            .await
    }

    /// Runs the test; `cancel` is fired when the window closes.
    pub(crate) async fn measure_until(
        &self,
        host: &str,
        progress: &dyn ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<ThroughputReport> {
        let connections = self.settings.download_connections;
        let duration = self.settings.download_time();

        // all-or-nothing: one failed open drops (and closes) the others
        let urls: Vec<String> = (0..connections)
            .map(|_| download_url(host, self.settings.download_size))
            .collect();
        let opens = urls.iter().map(|url| self.transport.open(url));
        let open_timeout = self.settings.open_timeout();
        let streams = match time::timeout(open_timeout, future::try_join_all(opens)).await {
            Ok(Ok(streams)) => streams,
            Ok(Err(e)) => {
                return Err(SpeedtestError::TransferFailed(format!(
                    "could not open streams to {}: {}",
                    host, e
                )))
            }
            Err(_) => {
                return Err(SpeedtestError::TransferFailed(format!(
                    "streams to {} not open after {:?}",
                    host, open_timeout
                )))
            }
        };

        info!("{} streams open to {}", connections, host);

        let counters: Vec<AtomicU64> = (0..connections).map(|_| AtomicU64::new(0)).collect();
        let failed = AtomicUsize::new(0);
        let start = Instant::now();

        let slots = streams.into_iter().enumerate().map(|(slot, stream)| {
            self.run_slot(slot, stream, host, &counters[slot], &failed, &cancel)
        });

        let sampler = async {
            let mut ticker = time::interval(self.settings.sample_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let deadline = time::sleep_until(start + duration);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let elapsed = start.elapsed();
                        if !elapsed.is_zero() {
                            progress.on_progress(ProgressEvent::Throughput {
                                host: host.to_string(),
                                elapsed,
                                kbps: kbps(sum(&counters), elapsed),
                            });
                        }
                    }
                }
            }

            let elapsed = start.elapsed();
            cancel.cancel();
            elapsed
        };

        let (exits, elapsed) = tokio::join!(future::join_all(slots), sampler);

        // every slot loop has returned, so the counters are final
        let bytes_per_slot: Vec<u64> = counters.iter().map(|c| c.load(Ordering::Acquire)).collect();
        let total_bytes: u64 = bytes_per_slot.iter().sum();
        let reopens_per_slot = exits.iter().map(|e| e.reopens).collect();

        let errors: Vec<String> = exits
            .into_iter()
            .filter_map(|e| e.error.map(|err| err.to_string()))
            .collect();
        if errors.len() == connections {
            return Err(SpeedtestError::TransferFailed(format!(
                "all streams to {} lost: {}",
                host,
                errors.join(", ")
            )));
        }
        if total_bytes == 0 {
            return Err(SpeedtestError::TransferFailed(format!(
                "no data received from {}",
                host
            )));
        }

        let report = ThroughputReport {
            bytes_per_slot,
            reopens_per_slot,
            total_bytes,
            elapsed,
            kbps: kbps(total_bytes, elapsed),
        };
        debug!("{}: {:?}", host, report);

        Ok(report)
    }

    /// Reads until cancelled, reopening the stream whenever it ends or errors.
    async fn run_slot(
        &self,
        slot: usize,
        mut stream: Box<dyn DownloadStream>,
        host: &str,
        counter: &AtomicU64,
        failed: &AtomicUsize,
        cancel: &CancellationToken,
    ) -> SlotExit {
        let mut buf = vec![0u8; self.settings.buffer_size];
        let mut reopens = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = stream.read(&mut buf) => read,
            };

            match read {
                Ok(n) if n > 0 => {
                    counter.fetch_add(n as u64, Ordering::Release);
                    continue;
                }
                Ok(_) => debug!("slot {} exhausted, reopening", slot),
                Err(e) => debug!("slot {} read error ({}), reopening", slot, e),
            }

            // close the old connection before opening its replacement
            drop(stream);

            if cancel.is_cancelled() {
                return SlotExit {
                    reopens,
                    error: None,
                };
            }

            let url = download_url(host, self.settings.download_size);
            let reopened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SlotExit { reopens, error: None },
                res = self.transport.open(&url) => res,
            };

            match reopened {
                Ok(next) => {
                    stream = next;
                    reopens += 1;
                }
                Err(e) => {
                    warn!("slot {} could not reopen stream to {}: {}", slot, host, e);
                    if failed.fetch_add(1, Ordering::AcqRel) + 1 == self.settings.download_connections {
                        cancel.cancel();
                    }
                    return SlotExit {
                        reopens,
                        error: Some(e),
                    };
                }
            }
        }

        SlotExit {
            reopens,
            error: None,
        }
    }
}

fn sum(counters: &[AtomicU64]) -> u64 {
    counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
}

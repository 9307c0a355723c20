use crate::config::Settings;
use crate::progress::{ProgressCallback, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Console rendering of progress events.
///
/// Every host ends in one line: `ping ms | bitrate kbit | host`, or ERROR in both columns.
pub struct ConsoleReporter {
    interactive: bool,
    list_candidates: bool,
    live: Mutex<Option<LiveLine>>,
}

/// Spinner for the host under test.
struct LiveLine {
    pb: ProgressBar,
    latency_ms: f64,
}

impl ConsoleReporter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            interactive: settings.interactive,
            list_candidates: settings.verbose || settings.debug,
            live: Mutex::new(None),
        }
    }

    fn start_bar(&self, latency_ms: f64, host: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(live_line(latency_ms, 0, host));
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut live) = self.live.lock() {
            if let Some(old) = live.replace(LiveLine { pb, latency_ms }) {
                old.pb.finish_and_clear();
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut live) = self.live.lock() {
            if let Some(line) = live.take() {
                line.pb.finish_and_clear();
            }
        }
    }
}

fn live_line(latency_ms: f64, kbps: u64, host: &str) -> String {
    format!("{:6.1} ms | {:8} kbit | {}", latency_ms, kbps, host)
}

impl ProgressCallback for ConsoleReporter {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CandidatesRanked { term, candidates } => {
                if self.list_candidates {
                    println!("Server search: {}", term);
                    for candidate in &candidates {
                        println!("{}", candidate);
                    }
                    println!();
                }
            }
            ProgressEvent::HostStarted { host, latency_ms } => {
                if self.interactive {
                    self.start_bar(latency_ms, &host);
                }
            }
            ProgressEvent::Throughput { host, kbps, .. } => {
                if let Ok(live) = self.live.lock() {
                    if let Some(line) = live.as_ref() {
                        line.pb.set_message(live_line(line.latency_ms, kbps, &host));
                    }
                }
            }
            ProgressEvent::HostCompleted(result) => {
                self.finish_bar();
                println!("{}", result);
            }
        }
    }
}

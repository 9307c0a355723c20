//! speedtest - latency and download throughput against the closest speed test servers
//!
//! Servers come from a searchable directory. The best candidates by ping are tested with
//! several concurrent downloads for a fixed window, and each host yields one
//! [`MeasurementResult`].

pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod icmp;
pub mod latency;
pub mod orchestrator;
pub mod progress;
pub mod ranker;
pub mod report;
pub mod stats;
pub mod store;
pub mod throughput;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use error::{Result, SpeedtestError};
pub use orchestrator::{Orchestrator, Outcome, RunReport};
pub use progress::{ProgressCallback, ProgressEvent};
pub use types::{Latency, MeasurementResult};

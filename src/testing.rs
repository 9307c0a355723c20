//! In-memory network doubles shared by the unit tests.

use crate::error::{Result, SpeedtestError};
use crate::traits::{DirectorySource, DownloadStream, DownloadTransport, Pinger};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replies per host in sequence; the last reply repeats. Unknown hosts never answer.
#[derive(Default)]
pub struct MockPinger {
    replies: HashMap<String, Vec<Option<Duration>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockPinger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str, replies_ms: &[Option<u64>]) -> Self {
        let replies = replies_ms
            .iter()
            .map(|r| r.map(Duration::from_millis))
            .collect();
        self.replies.insert(host.to_string(), replies);
        self
    }

    pub fn host_micros(mut self, host: &str, micros: u64) -> Self {
        self.replies
            .insert(host.to_string(), vec![Some(Duration::from_micros(micros))]);
        self
    }

    pub fn calls(&self, host: &str) -> usize {
        self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Pinger for MockPinger {
    async fn ping(&self, host: &str, _timeout: Duration) -> Option<Duration> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(host.to_string()).or_insert(0);
            *n += 1;
            *n - 1
        };
        let replies = self.replies.get(host)?;
        let reply = replies.get(n).or(replies.last())?;
        *reply
    }
}

/// Directory bodies per search term; unknown terms fail.
#[derive(Default)]
pub struct MockDirectory {
    bodies: HashMap<String, String>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: &str, body: &str) -> Self {
        self.bodies.insert(term.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl DirectorySource for MockDirectory {
    async fn query(&self, term: &str, _limit: usize) -> Result<String> {
        self.bodies
            .get(term)
            .cloned()
            .ok_or_else(|| SpeedtestError::DirectoryUnavailable(format!("no such term: {}", term)))
    }
}

/// Behaviour of one opened download.
#[derive(Debug, Clone)]
pub enum Script {
    FailOpen,
    /// `total` bytes, one read every `delay`, then end of stream.
    Deliver { total: u64, delay: Duration },
    /// `total` bytes, then a read error.
    ErrorAfter { total: u64, delay: Duration },
    /// Every read waits forever.
    Stall,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open { id: usize, url: String },
    Close { id: usize },
}

#[derive(Default)]
struct Shared {
    events: Vec<Event>,
    delivered: u64,
    reads_after_cancel: usize,
    opens: usize,
}

/// Download transport driven by a list of scripts consumed in open order.
/// Hosts listed in `unhealthy` fail `check` and every `open`; hosts listed in
/// `hanging` never answer either.
pub struct MockTransport {
    scripts: Mutex<Vec<Script>>,
    fallback: Script,
    unhealthy: HashSet<String>,
    hanging: HashSet<String>,
    shared: Arc<Mutex<Shared>>,
    cancel: Option<CancellationToken>,
}

impl MockTransport {
    pub fn new(scripts: Vec<Script>, fallback: Script) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().rev().collect()),
            fallback,
            unhealthy: HashSet::new(),
            hanging: HashSet::new(),
            shared: Arc::new(Mutex::new(Shared::default())),
            cancel: None,
        }
    }

    /// Every open delivers `total` bytes and ends.
    pub fn steady(total: u64, delay: Duration) -> Self {
        Self::new(Vec::new(), Script::Deliver { total, delay })
    }

    pub fn unhealthy(mut self, host: &str) -> Self {
        self.unhealthy.insert(host.to_string());
        self
    }

    pub fn hanging(mut self, host: &str) -> Self {
        self.hanging.insert(host.to_string());
        self
    }

    /// Reads that start after `token` fires are counted as violations.
    pub fn watch(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.lock().unwrap().events.clone()
    }

    pub fn delivered(&self) -> u64 {
        self.shared.lock().unwrap().delivered
    }

    pub fn reads_after_cancel(&self) -> usize {
        self.shared.lock().unwrap().reads_after_cancel
    }

    pub fn opens(&self) -> usize {
        self.shared.lock().unwrap().opens
    }

    fn is_unhealthy(&self, url: &str) -> bool {
        matches_host(&self.unhealthy, url)
    }

    fn is_hanging(&self, url: &str) -> bool {
        matches_host(&self.hanging, url)
    }
}

fn matches_host(hosts: &HashSet<String>, url: &str) -> bool {
    hosts
        .iter()
        .any(|host| url.starts_with(&format!("https://{}/", host)))
}

#[async_trait]
impl DownloadTransport for MockTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn DownloadStream>> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.fallback.clone());

        let id = {
            let mut shared = self.shared.lock().unwrap();
            let id = shared.opens;
            shared.opens += 1;
            shared.events.push(Event::Open {
                id,
                url: url.to_string(),
            });
            id
        };

        if self.is_hanging(url) {
            std::future::pending::<()>().await;
        }

        if self.is_unhealthy(url) || matches!(script, Script::FailOpen) {
            self.shared.lock().unwrap().events.push(Event::Close { id });
            return Err(SpeedtestError::TransferFailed("connection refused".to_string()));
        }

        Ok(Box::new(MockStream {
            id,
            script,
            sent: 0,
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
        }))
    }

    async fn check(&self, url: &str) -> Result<()> {
        if self.is_hanging(url) {
            std::future::pending::<()>().await;
        }
        if self.is_unhealthy(url) {
            Err(SpeedtestError::TransferFailed("503".to_string()))
        } else {
            Ok(())
        }
    }
}

struct MockStream {
    id: usize,
    script: Script,
    sent: u64,
    shared: Arc<Mutex<Shared>>,
    cancel: Option<CancellationToken>,
}

#[async_trait]
impl DownloadStream for MockStream {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            self.shared.lock().unwrap().reads_after_cancel += 1;
        }

        let (total, delay, fail_at_end) = match self.script {
            Script::Deliver { total, delay } => (total, delay, false),
            Script::ErrorAfter { total, delay } => (total, delay, true),
            Script::Stall | Script::FailOpen => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        if self.sent >= total {
            return if fail_at_end {
                Err(std::io::Error::other("connection reset"))
            } else {
                Ok(0)
            };
        }

        tokio::time::sleep(delay).await;
        let n = (total - self.sent).min(buf.len() as u64);
        self.sent += n;
        self.shared.lock().unwrap().delivered += n;
        Ok(n as usize)
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.events.push(Event::Close { id: self.id });
        }
    }
}

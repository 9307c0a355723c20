use crate::error::{Result, SpeedtestError};
use crate::traits::Pinger;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use tracing::debug;
use url::{Host, Url};

const PAYLOAD: [u8; 32] = [0; 32];

/// Resolves a directory host (`name:port`) to the address to ping. The port is ignored.
pub async fn resolve(host: &str) -> Result<IpAddr> {
    let url = Url::parse(&format!("https://{}", host))
        .map_err(|e| SpeedtestError::InvalidHost(format!("{}: {}", host, e)))?;

    match url.host() {
        Some(Host::Ipv4(addr)) => Ok(IpAddr::V4(addr)),
        Some(Host::Ipv6(addr)) => Ok(IpAddr::V6(addr)),
        Some(Host::Domain(name)) => tokio::net::lookup_host((name, 0))
            .await?
            .map(|addr| addr.ip())
            .next()
            .ok_or_else(|| SpeedtestError::InvalidHost(format!("{}: no address", host))),
        None => Err(SpeedtestError::InvalidHost(host.to_string())),
    }
}

/// ICMP echo over IPv4, and IPv6 when the system allows it.
pub struct IcmpPinger {
    v4: Client,
    v6: Option<Client>,
    seq: AtomicU16,
}

impl IcmpPinger {
    pub fn new() -> Result<Self> {
        let v4 = Client::new(&Config::default())?;
        let v6 = match Client::new(&Config::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                debug!("IPv6 ping unavailable: {}", e);
                None
            }
        };

        Ok(Self {
            v4,
            v6,
            seq: AtomicU16::new(0),
        })
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn ping(&self, host: &str, timeout: Duration) -> Option<Duration> {
        let addr = match resolve(host).await {
            Ok(addr) => addr,
            Err(e) => {
                debug!("cannot resolve {}: {}", host, e);
                return None;
            }
        };

        let client = match addr {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self.v6.as_ref()?,
        };

        let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        match pinger.ping(PingSequence(seq), &PAYLOAD).await {
            Ok((_, rtt)) => Some(rtt),
            Err(e) => {
                debug!("ping {} ({}) failed: {}", host, addr, e);
                None
            }
        }
    }
}

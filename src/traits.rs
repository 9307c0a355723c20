use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Pinger: 发送单个 ICMP echo 请求
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Round-trip time of one echo request, or None if the host did not answer in time
    /// (timeout, unreachable, TTL exceeded, unresolvable name).
    async fn ping(&self, host: &str, timeout: Duration) -> Option<Duration>;
}

/// DirectorySource: 查询服务器目录, 返回未解析的响应体
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn query(&self, term: &str, limit: usize) -> Result<String>;
}

/// One open download. Dropping it closes the underlying connection.
#[async_trait]
pub trait DownloadStream: Send {
    /// Reads into `buf`. `Ok(0)` means the stream is exhausted.
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// DownloadTransport: 打开下载流
#[async_trait]
pub trait DownloadTransport: Send + Sync {
    /// Starts a download and returns once the response body can be read.
    async fn open(&self, url: &str) -> Result<Box<dyn DownloadStream>>;

    /// Issues a request and reads only the response headers.
    async fn check(&self, url: &str) -> Result<()>;
}

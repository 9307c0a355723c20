use crate::error::Result;
use crate::traits::{DirectorySource, DownloadStream, DownloadTransport};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::debug;

// 目录请求超时
const REQUEST_TIMEOUT: u64 = 10;
// 下载连接只限制建连时间, 读取由测速窗口控制
const CONNECT_TIMEOUT: u64 = 5;

/// Directory search over HTTP.
pub struct HttpDirectory {
    client: Client,
    url: String,
}

impl HttpDirectory {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl DirectorySource for HttpDirectory {
    async fn query(&self, term: &str, limit: usize) -> Result<String> {
        let limit = limit.to_string();
        let request = self.client.get(&self.url).query(&[
            ("search", term),
            ("https_functional", "1"),
            ("limit", limit.as_str()),
        ]);
        debug!("GET {} search={:?} limit={}", self.url, term, limit);

        let body = request.send().await?.error_for_status()?.text().await?;
        Ok(body)
    }
}

/// Download transport. Test hosts often present certificates for another name,
/// so certificate validation is off for downloads only.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .build()?;
        Ok(Self { client })
    }
}

struct HttpStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

#[async_trait]
impl DownloadStream for HttpStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).await
    }
}

#[async_trait]
impl DownloadTransport for HttpTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn DownloadStream>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes_stream().map_err(io::Error::other).boxed();

        Ok(Box::new(HttpStream {
            reader: Box::new(StreamReader::new(body)),
        }))
    }

    async fn check(&self, url: &str) -> Result<()> {
        // send() resolves once headers are in; the body is dropped unread
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

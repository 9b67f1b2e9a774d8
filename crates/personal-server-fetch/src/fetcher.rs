//! Gateway fetch with fallback and backoff.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;

use crate::error::{FailureClass, FetchError, Result};
use crate::uri::ContentUri;

/// Public gateways, in the order they are tried.
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://dweb.link/ipfs/",
    "https://ipfs.io/ipfs/",
    "https://cloudflare-ipfs.com/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
    "https://ipfs.filebase.io/ipfs/",
    "https://nftstorage.link/ipfs/",
    "https://w3s.link/ipfs/",
];

/// Default upper bound on a single payload (5 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Delay schedule between failed gateway attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Configuration for content retrieval.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Gateway base URLs, tried in order.
    pub gateways: Vec<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Largest payload accepted.
    pub max_bytes: u64,
    /// Backoff between failed attempts.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            timeout: Duration::from_secs(10),
            max_bytes: DEFAULT_MAX_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    /// Replace the gateway list.
    pub fn with_gateways<I, S>(mut self, gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gateways = gateways.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the payload limit.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the backoff schedule.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Anything that can produce the bytes behind a content URI.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the content at `uri` under the source's configured limits.
    async fn fetch(&self, uri: &str) -> Result<Bytes>;
}

/// Outcome of one attempt against one URL.
enum AttemptError {
    TooLarge { size: u64 },
    Failed(FailureClass, String),
}

fn classify_status(status: StatusCode) -> FailureClass {
    match status {
        StatusCode::NOT_FOUND => FailureClass::NotFound,
        StatusCode::TOO_MANY_REQUESTS => FailureClass::RateLimited,
        _ => FailureClass::Generic,
    }
}

fn classify_error(err: &reqwest::Error) -> FailureClass {
    if err.is_timeout() {
        FailureClass::Timeout
    } else {
        FailureClass::Generic
    }
}

/// HTTP content fetcher. Holds no cache; every call goes to the network.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl ContentFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch with explicit limits, overriding the configured ones.
    pub async fn fetch_with(
        &self,
        uri: &str,
        max_bytes: u64,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Bytes> {
        let candidates = ContentUri::parse(uri)?.candidates(&self.config.gateways);
        if candidates.is_empty() {
            return Err(FetchError::InvalidUri(format!(
                "{} (no gateways configured)",
                uri
            )));
        }

        let mut last = (FailureClass::Generic, String::new());
        // Backoff grows with retryable failures only; a 404 costs no delay.
        let mut retries = 0u32;
        for (attempt, url) in candidates.iter().enumerate() {
            tracing::debug!(gateway = %url, attempt, "fetching content");

            match self.try_once(url, max_bytes, timeout).await {
                Ok(body) => {
                    tracing::debug!(gateway = %url, bytes = body.len(), "content fetched");
                    return Ok(body);
                }
                Err(AttemptError::TooLarge { size }) => {
                    tracing::warn!(gateway = %url, size, limit = max_bytes, "payload over limit");
                    return Err(FetchError::TooLarge {
                        size,
                        limit: max_bytes,
                    });
                }
                Err(AttemptError::Failed(class, message)) => {
                    tracing::warn!(gateway = %url, failure = %class, %message, "gateway attempt failed");
                    let is_last = attempt + 1 == candidates.len();
                    if class != FailureClass::NotFound {
                        if !is_last {
                            tokio::time::sleep(retry.delay(retries)).await;
                        }
                        retries += 1;
                    }
                    last = (class, message);
                }
            }
        }

        Err(FetchError::Exhausted {
            uri: uri.to_string(),
            attempts: candidates.len(),
            last: last.0,
            message: last.1,
        })
    }

    async fn try_once(
        &self,
        url: &str,
        max_bytes: u64,
        timeout: Duration,
    ) -> std::result::Result<Bytes, AttemptError> {
        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AttemptError::Failed(classify_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Failed(
                classify_status(status),
                format!("HTTP {}", status),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(AttemptError::TooLarge { size: len });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AttemptError::Failed(classify_error(&e), e.to_string()))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(AttemptError::TooLarge { size });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}

#[async_trait]
impl ContentSource for ContentFetcher {
    async fn fetch(&self, uri: &str) -> Result<Bytes> {
        self.fetch_with(
            uri,
            self.config.max_bytes,
            self.config.timeout,
            self.config.retry,
        )
        .await
    }
}

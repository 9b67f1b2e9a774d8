//! In-memory content store standing in for the gateways.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use personal_server_fetch::{ContentSource, FailureClass, FetchError, Result};

/// A [`ContentSource`] serving blobs from a map, with a fetch log.
#[derive(Default)]
pub struct MemoryContent {
    blobs: RwLock<HashMap<String, Bytes>>,
    log: RwLock<Vec<String>>,
    delay: RwLock<Option<Duration>>,
    max_bytes: Option<u64>,
}

impl MemoryContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject blobs larger than `max_bytes`, like the real fetcher.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn insert(&self, uri: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs.write().unwrap().insert(uri.into(), data.into());
    }

    pub fn remove(&self, uri: &str) {
        self.blobs.write().unwrap().remove(uri);
    }

    /// Hold every fetch for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().unwrap() = delay;
    }

    /// URIs requested so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.log.read().unwrap().clone()
    }

    pub fn fetch_count(&self, uri: &str) -> usize {
        self.log.read().unwrap().iter().filter(|u| *u == uri).count()
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn fetch(&self, uri: &str) -> Result<Bytes> {
        self.log.write().unwrap().push(uri.to_string());

        let delay = *self.delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let blob = self.blobs.read().unwrap().get(uri).cloned();
        match blob {
            Some(data) => match self.max_bytes {
                Some(limit) if data.len() as u64 > limit => Err(FetchError::TooLarge {
                    size: data.len() as u64,
                    limit,
                }),
                _ => Ok(data),
            },
            None => Err(FetchError::Exhausted {
                uri: uri.to_string(),
                attempts: 1,
                last: FailureClass::NotFound,
                message: "HTTP 404 Not Found".into(),
            }),
        }
    }
}

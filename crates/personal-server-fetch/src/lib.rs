//! # Personal Server Fetch
//!
//! Retrieves content-addressed blobs (encrypted files, grant documents)
//! through an ordered list of HTTP gateways.
//!
//! - `404` moves to the next gateway immediately.
//! - `429`, other HTTP errors, timeouts and connection errors back off
//!   exponentially before the next gateway.
//! - Payloads over the size limit fail at once, from the `content-length`
//!   header when present and from the streamed body otherwise.
//!
//! Nothing is cached and nothing is decrypted here.

pub mod error;
pub mod fetcher;
pub mod uri;

pub use error::{FailureClass, FetchError, Result};
pub use fetcher::{
    ContentFetcher, ContentSource, FetchConfig, RetryPolicy, DEFAULT_GATEWAYS, DEFAULT_MAX_BYTES,
};
pub use uri::ContentUri;

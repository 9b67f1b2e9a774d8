//! Content URI resolution.

use crate::error::{FetchError, Result};

const IPFS_SCHEME: &str = "ipfs://";
const GATEWAY_SEGMENT: &str = "/ipfs/";

/// A parsed content location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUri {
    /// Content-addressed: `<cid>[/path]`, resolvable through any gateway.
    Addressed {
        path: String,
        /// A gateway URL the caller named explicitly, tried first.
        preferred: Option<String>,
    },
    /// A plain URL fetched as-is.
    Direct(String),
}

impl ContentUri {
    /// Parse `ipfs://...`, a gateway URL containing `/ipfs/...`, or any http(s) URL.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if let Some(rest) = uri.strip_prefix(IPFS_SCHEME) {
            let path = rest.trim_start_matches('/');
            if path.is_empty() {
                return Err(FetchError::InvalidUri(uri.to_string()));
            }
            return Ok(ContentUri::Addressed {
                path: path.to_string(),
                preferred: None,
            });
        }

        if uri.starts_with("https://") || uri.starts_with("http://") {
            if let Some(idx) = uri.find(GATEWAY_SEGMENT) {
                let path = &uri[idx + GATEWAY_SEGMENT.len()..];
                if !path.is_empty() {
                    return Ok(ContentUri::Addressed {
                        path: path.to_string(),
                        preferred: Some(uri.to_string()),
                    });
                }
            }
            return Ok(ContentUri::Direct(uri.to_string()));
        }

        Err(FetchError::InvalidUri(uri.to_string()))
    }

    /// Candidate URLs in the order they should be tried.
    pub fn candidates(&self, gateways: &[String]) -> Vec<String> {
        match self {
            ContentUri::Direct(url) => vec![url.clone()],
            ContentUri::Addressed { path, preferred } => {
                let mut out: Vec<String> = preferred.iter().cloned().collect();
                for gateway in gateways {
                    let url = join(gateway, path);
                    if !out.contains(&url) {
                        out.push(url);
                    }
                }
                out
            }
        }
    }
}

fn join(base: &str, path: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

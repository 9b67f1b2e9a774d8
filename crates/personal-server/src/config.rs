//! Server configuration.
//!
//! [`ServerConfig`] can be deserialized or read from the process environment.
//! The component configs are derived from it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use personal_server_chain::{ChainConfig, MOKSHA_CHAIN_ID};
use personal_server_crypto::ContainerLimits;
use personal_server_fetch::{FetchConfig, DEFAULT_MAX_BYTES};
use personal_server_perms::{FileAuthority, ResolverConfig, DEFAULT_SUPPORTED_OPERATIONS};

use crate::error::{Result, ServerError};
use crate::orchestrator::OrchestratorConfig;

/// Top-level configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// BIP-39 phrase every server key is derived from.
    pub wallet_mnemonic: Zeroizing<String>,
    pub mnemonic_language: String,
    pub chain_id: u64,
    /// Overrides the known RPC endpoint for `chain_id`.
    pub chain_rpc_url: Option<String>,
    /// Gateway base URLs in priority order. Empty means the defaults.
    pub ipfs_gateways: Vec<String>,
    /// Bound on each chain call and each gateway request.
    pub request_timeout_seconds: u64,
    pub max_file_size_bytes: u64,
    pub supported_operations: Vec<String>,
    pub file_authority: FileAuthority,
    pub provider_timeout_seconds: u64,
    /// Highest coded S2K count accepted in file containers.
    pub max_s2k_count: u8,
    /// SQLite file for operation records. Records are kept in memory when unset.
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            wallet_mnemonic: Zeroizing::new(String::new()),
            mnemonic_language: "english".into(),
            chain_id: MOKSHA_CHAIN_ID,
            chain_rpc_url: None,
            ipfs_gateways: Vec::new(),
            request_timeout_seconds: 10,
            max_file_size_bytes: DEFAULT_MAX_BYTES,
            supported_operations: DEFAULT_SUPPORTED_OPERATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            file_authority: FileAuthority::OnChain,
            provider_timeout_seconds: OrchestratorConfig::default().provider_timeout.as_secs(),
            max_s2k_count: ContainerLimits::default().max_s2k_count,
            database_path: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("wallet_mnemonic", &"<redacted>")
            .field("mnemonic_language", &self.mnemonic_language)
            .field("chain_id", &self.chain_id)
            .field("chain_rpc_url", &self.chain_rpc_url)
            .field("ipfs_gateways", &self.ipfs_gateways)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("supported_operations", &self.supported_operations)
            .field("file_authority", &self.file_authority)
            .field("provider_timeout_seconds", &self.provider_timeout_seconds)
            .field("max_s2k_count", &self.max_s2k_count)
            .field("database_path", &self.database_path)
            .finish()
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::Config(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_file_authority(value: &str) -> Result<FileAuthority> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on_chain" | "onchain" => Ok(FileAuthority::OnChain),
        "grant" => Ok(FileAuthority::Grant),
        other => Err(ServerError::Config(format!(
            "FILE_AUTHORITY must be 'on_chain' or 'grant', got '{}'",
            other
        ))),
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name
    /// to its value. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.wallet_mnemonic = lookup("WALLET_MNEMONIC")
            .map(Zeroizing::new)
            .ok_or_else(|| ServerError::Config("WALLET_MNEMONIC is required".into()))?;
        if let Some(language) = lookup("MNEMONIC_LANGUAGE") {
            config.mnemonic_language = language;
        }
        if let Some(id) = lookup("CHAIN_ID") {
            config.chain_id = parse_number("CHAIN_ID", &id)?;
        }
        config.chain_rpc_url = lookup("CHAIN_RPC_URL").filter(|url| !url.trim().is_empty());
        if let Some(gateways) = lookup("IPFS_GATEWAYS") {
            config.ipfs_gateways = split_list(&gateways);
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = parse_number("REQUEST_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(bytes) = lookup("MAX_FILE_SIZE_BYTES") {
            config.max_file_size_bytes = parse_number("MAX_FILE_SIZE_BYTES", &bytes)?;
        }
        if let Some(ops) = lookup("SUPPORTED_OPERATIONS") {
            config.supported_operations = split_list(&ops);
        }
        if let Some(authority) = lookup("FILE_AUTHORITY") {
            config.file_authority = parse_file_authority(&authority)?;
        }
        if let Some(secs) = lookup("PROVIDER_TIMEOUT_SECONDS") {
            config.provider_timeout_seconds = parse_number("PROVIDER_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(count) = lookup("MAX_S2K_COUNT") {
            config.max_s2k_count = parse_number("MAX_S2K_COUNT", &count)?
                .try_into()
                .map_err(|_| ServerError::Config(format!("MAX_S2K_COUNT must be at most 255, got '{}'", count)))?;
        }
        config.database_path = lookup("DATABASE_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Reject values no component could work with.
    pub fn validate(&self) -> Result<()> {
        if self.wallet_mnemonic.trim().is_empty() {
            return Err(ServerError::Config("wallet mnemonic is empty".into()));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ServerError::Config("request timeout must be positive".into()));
        }
        if self.provider_timeout_seconds == 0 {
            return Err(ServerError::Config("provider timeout must be positive".into()));
        }
        if self.max_file_size_bytes == 0 {
            return Err(ServerError::Config("max file size must be positive".into()));
        }
        if self.supported_operations.is_empty() {
            return Err(ServerError::Config("no supported operations".into()));
        }
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Chain preset for `chain_id`, with the RPC override applied.
    pub fn chain_config(&self) -> Result<ChainConfig> {
        let mut chain = ChainConfig::for_chain(self.chain_id)?.with_timeout(self.request_timeout());
        if let Some(url) = &self.chain_rpc_url {
            chain = chain.with_rpc_url(url.clone());
        }
        Ok(chain)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let mut fetch = FetchConfig::default()
            .with_timeout(self.request_timeout())
            .with_max_bytes(self.max_file_size_bytes);
        if !self.ipfs_gateways.is_empty() {
            fetch = fetch.with_gateways(self.ipfs_gateways.iter().cloned());
        }
        fetch
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_supported_operations(self.supported_operations.iter().cloned())
            .with_file_authority(self.file_authority)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_provider_timeout(Duration::from_secs(self.provider_timeout_seconds))
            .with_container_limits(ContainerLimits {
                max_s2k_count: self.max_s2k_count,
                ..ContainerLimits::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personal_server_chain::MAINNET_CHAIN_ID;
    use personal_server_core::ErrorKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const PHRASE: &str = "test test test test test test test test test test test junk";

    #[test]
    fn test_defaults_from_minimal_env() {
        let config = ServerConfig::from_lookup(lookup(&[("WALLET_MNEMONIC", PHRASE)])).unwrap();
        assert_eq!(config.chain_id, MOKSHA_CHAIN_ID);
        assert_eq!(config.mnemonic_language, "english");

        let chain = config.chain_config().unwrap();
        assert_eq!(chain.rpc_url, "https://rpc.moksha.vana.org");
        assert_eq!(chain.request_timeout, Duration::from_secs(10));

        let fetch = config.fetch_config();
        assert_eq!(fetch.gateways[0], "https://dweb.link/ipfs/");
        assert_eq!(fetch.max_bytes, 5 * 1024 * 1024);

        assert_eq!(config.resolver_config(), ResolverConfig::default());
        assert_eq!(config.orchestrator_config(), OrchestratorConfig::default());
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("WALLET_MNEMONIC", PHRASE),
            ("CHAIN_ID", "1480"),
            ("CHAIN_RPC_URL", "http://localhost:8545"),
            ("IPFS_GATEWAYS", " https://a.example/ipfs/ , https://b.example/ipfs/,"),
            ("REQUEST_TIMEOUT_SECONDS", "3"),
            ("MAX_FILE_SIZE_BYTES", "1024"),
            ("SUPPORTED_OPERATIONS", "llm_inference,agent_task"),
            ("FILE_AUTHORITY", "grant"),
            ("PROVIDER_TIMEOUT_SECONDS", "30"),
            ("MAX_S2K_COUNT", "255"),
            ("DATABASE_PATH", "/var/lib/ps/ops.db"),
        ]))
        .unwrap();

        let chain = config.chain_config().unwrap();
        assert_eq!(chain.chain_id, MAINNET_CHAIN_ID);
        assert_eq!(chain.rpc_url, "http://localhost:8545");
        assert_eq!(chain.request_timeout, Duration::from_secs(3));

        let fetch = config.fetch_config();
        assert_eq!(fetch.gateways, vec!["https://a.example/ipfs/", "https://b.example/ipfs/"]);
        assert_eq!(fetch.max_bytes, 1024);

        let resolver = config.resolver_config();
        assert_eq!(resolver.supported_operations, vec!["llm_inference", "agent_task"]);
        assert_eq!(resolver.file_authority, FileAuthority::Grant);

        assert_eq!(
            config.orchestrator_config().provider_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(config.orchestrator_config().container_limits.max_s2k_count, 0xff);
        assert_eq!(config.database_path, Some(PathBuf::from("/var/lib/ps/ops.db")));
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(ServerConfig::from_lookup(lookup(&[
            ("WALLET_MNEMONIC", PHRASE),
            ("CHAIN_ID", "moksha"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("WALLET_MNEMONIC", PHRASE),
            ("FILE_AUTHORITY", "whatever"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("WALLET_MNEMONIC", PHRASE),
            ("MAX_S2K_COUNT", "256"),
        ]))
        .is_err());

        let config = ServerConfig::from_lookup(lookup(&[
            ("WALLET_MNEMONIC", PHRASE),
            ("CHAIN_ID", "1"),
        ]))
        .unwrap();
        assert_eq!(config.chain_config().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_deserialize_and_redacted_debug() {
        let config: ServerConfig = serde_json::from_value(serde_json::json!({
            "wallet_mnemonic": PHRASE,
            "file_authority": "grant",
            "ipfs_gateways": ["https://a.example/ipfs/"],
        }))
        .unwrap();
        assert_eq!(config.file_authority, FileAuthority::Grant);
        assert_eq!(config.request_timeout_seconds, 10);

        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("junk"));
    }
}

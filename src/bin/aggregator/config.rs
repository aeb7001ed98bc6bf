use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use jubjub_aggregator::adapters::bb_prover::DEFAULT_CIRCUIT_NAME;
use jubjub_aggregator::coordinator::EmptyQueuePolicy;
use jubjub_aggregator::domain::selection::{SelectionPolicy, DEFAULT_MAX_TRANSFERS};
use serde::Deserialize;

/// Overrides `chain.private_key`.
pub const ETH_PRIVATE_KEY_ENV: &str = "ETH_PRIVATE_KEY";
/// Overrides `account.private_key`.
pub const BOJ_PRIVATE_KEY_ENV: &str = "BOJ_PRIVATE_KEY";

/// Top-level aggregator configuration loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct AggregatorConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub account: AccountConfig,
    pub prover: ProverConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Signs `processPendingTransfer`. Only needed to submit.
    pub private_key: Option<String>,
    pub private_token_address: Address,
    /// Block explorer base URL for transaction links (e.g. "https://sepolia.etherscan.io/tx").
    /// When absent, raw tx hashes are printed instead.
    pub explorer_url: Option<String>,
}

/// BabyJubJub account whose queue is processed by default.
#[derive(Debug, Default, Deserialize)]
pub struct AccountConfig {
    pub private_key: Option<B256>,
}

#[derive(Debug, Deserialize)]
pub struct ProverConfig {
    /// Directory containing the Noir circuit projects.
    pub circuits_dir: PathBuf,
    #[serde(default = "default_circuit_name")]
    pub circuit_name: String,
    /// Noir executable, resolved from `PATH` unless a path is given.
    #[serde(default = "default_nargo")]
    pub nargo: PathBuf,
    /// Barretenberg CLI.
    #[serde(default = "default_bb")]
    pub bb: PathBuf,
    /// Upper bound on `nargo execute` + `bb prove` (e.g. "10m").
    #[serde(with = "humantime_serde", default = "default_prover_timeout")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct AggregationConfig {
    /// Must match the circuit's `encrypted_values` length divided by two.
    #[serde(default = "default_max_transfers")]
    pub max_transfers: usize,
    /// Only transfers paying strictly more than this are claimed. An integer,
    /// or a decimal or 0x-hex string for values beyond TOML's `i64`.
    #[serde(default, deserialize_with = "deserialize_fee")]
    pub min_fee: U256,
    #[serde(default)]
    pub empty_queue: EmptyQueuePolicy,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_transfers: default_max_transfers(),
            min_fee: U256::ZERO,
            empty_queue: EmptyQueuePolicy::default(),
        }
    }
}

impl AggregationConfig {
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::new(self.max_transfers, self.min_fee)
    }
}

/// TOML integers stop at `i64` and `U256` only accepts them as strings.
fn deserialize_fee<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fee {
        Int(u64),
        Str(String),
    }

    match Fee::deserialize(deserializer)? {
        Fee::Int(fee) => Ok(U256::from(fee)),
        Fee::Str(fee) => fee.parse().map_err(serde::de::Error::custom),
    }
}

fn default_circuit_name() -> String {
    DEFAULT_CIRCUIT_NAME.to_string()
}

fn default_nargo() -> PathBuf {
    PathBuf::from("nargo")
}

fn default_bb() -> PathBuf {
    PathBuf::from("bb")
}

fn default_prover_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_transfers() -> usize {
    DEFAULT_MAX_TRANSFERS
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AggregatorConfig {
    /// Load a config from a TOML file, apply environment overrides and validate.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_overrides(
            std::env::var(ETH_PRIVATE_KEY_ENV).ok(),
            std::env::var(BOJ_PRIVATE_KEY_ENV).ok(),
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Keys from the environment take precedence over the file.
    pub fn apply_overrides(
        &mut self,
        eth_private_key: Option<String>,
        boj_private_key: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = eth_private_key.filter(|k| !k.is_empty()) {
            self.chain.private_key = Some(key);
        }
        if let Some(key) = boj_private_key.filter(|k| !k.is_empty()) {
            let key = key.parse::<B256>().map_err(|e| {
                ConfigError::Validation(format!("{BOJ_PRIVATE_KEY_ENV} is not a 32-byte hex key: {e}"))
            })?;
            self.account.private_key = Some(key);
        }
        Ok(())
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(ConfigError::Validation("chain.rpc_url must not be empty".into()));
        }

        if self.prover.circuits_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "prover.circuits_dir must not be empty".into(),
            ));
        }

        // The contract takes the processed indexes as uint8[].
        let k = self.aggregation.max_transfers;
        if !(1..=255).contains(&k) {
            return Err(ConfigError::Validation(format!(
                "aggregation.max_transfers must be between 1 and 255, got {k}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[chain]
rpc_url = "http://localhost:8545"
private_token_address = "0x1234567890123456789012345678901234567890"

[prover]
circuits_dir = "../circuits"
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config: AggregatorConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.aggregation.max_transfers, DEFAULT_MAX_TRANSFERS);
        assert_eq!(config.aggregation.min_fee, U256::ZERO);
        assert_eq!(config.aggregation.empty_queue, EmptyQueuePolicy::Skip);
        assert_eq!(config.prover.circuit_name, "process_pending_transfers");
        assert_eq!(config.prover.timeout, Duration::from_secs(600));
        assert_eq!(config.prover.nargo, PathBuf::from("nargo"));
        assert!(config.chain.private_key.is_none());
        assert!(config.account.private_key.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[chain]
rpc_url = "https://rpc.sepolia.org"
private_key = "0xdead000000000000000000000000000000000000000000000000000000000001"
private_token_address = "0x1234567890123456789012345678901234567890"
explorer_url = "https://sepolia.etherscan.io/tx"

[account]
private_key = "0x0000000000000000000000000000000000000000000000000000000000000abc"

[prover]
circuits_dir = "/opt/circuits"
circuit_name = "process_pending_transfers_8"
bb = "/opt/bb/bin/bb"
timeout = "1h30m"

[aggregation]
max_transfers = 8
min_fee = 10
empty_queue = "submit"
"#;
        let config: AggregatorConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.aggregation.max_transfers, 8);
        assert_eq!(config.aggregation.empty_queue, EmptyQueuePolicy::Submit);
        assert_eq!(config.prover.timeout, Duration::from_secs(5400));
        assert_eq!(config.prover.bb, PathBuf::from("/opt/bb/bin/bb"));
        assert_eq!(
            config.account.private_key,
            Some(B256::left_padding_from(&[0x0a, 0xbc]))
        );

        let policy = config.aggregation.selection_policy();
        assert_eq!(policy.max_transfers, 8);
        assert_eq!(policy.min_fee, U256::from(10));
    }

    #[test]
    fn test_min_fee_beyond_u64() {
        let toml = format!("{MINIMAL}\n[aggregation]\nmin_fee = \"100000000000000000000\"\n");
        let config: AggregatorConfig = toml::from_str(&toml).unwrap();
        assert_eq!(
            config.aggregation.min_fee,
            U256::from(100_000_000_000_000_000_000u128)
        );

        let toml = format!("{MINIMAL}\n[aggregation]\nmin_fee = \"0xff\"\n");
        let config: AggregatorConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config.aggregation.selection_policy().min_fee, U256::from(255));
    }

    #[test]
    fn test_malformed_min_fee_rejected() {
        let toml = format!("{MINIMAL}\n[aggregation]\nmin_fee = \"ten\"\n");
        assert!(toml::from_str::<AggregatorConfig>(&toml).is_err());

        let toml = format!("{MINIMAL}\n[aggregation]\nmin_fee = -1\n");
        assert!(toml::from_str::<AggregatorConfig>(&toml).is_err());
    }

    #[test]
    fn test_zero_max_transfers_rejected() {
        let toml = format!("{MINIMAL}\n[aggregation]\nmax_transfers = 0\n");
        let config: AggregatorConfig = toml::from_str(&toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_transfers"));
    }

    #[test]
    fn test_max_transfers_must_fit_uint8_indexes() {
        let toml = format!("{MINIMAL}\n[aggregation]\nmax_transfers = 256\n");
        let config: AggregatorConfig = toml::from_str(&toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_rpc_url_rejected() {
        let toml = MINIMAL.replace("http://localhost:8545", " ");
        let config: AggregatorConfig = toml::from_str(&toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rpc_url"));
    }

    #[test]
    fn test_unknown_empty_queue_policy_rejected() {
        let toml = format!("{MINIMAL}\n[aggregation]\nempty_queue = \"retry\"\n");
        assert!(toml::from_str::<AggregatorConfig>(&toml).is_err());
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config: AggregatorConfig = toml::from_str(MINIMAL).unwrap();
        config
            .apply_overrides(
                Some("0xdead000000000000000000000000000000000000000000000000000000000009".into()),
                Some("0x00000000000000000000000000000000000000000000000000000000000000ff".into()),
            )
            .unwrap();

        assert_eq!(
            config.chain.private_key.as_deref(),
            Some("0xdead000000000000000000000000000000000000000000000000000000000009")
        );
        assert_eq!(
            config.account.private_key,
            Some(B256::left_padding_from(&[0xff]))
        );
    }

    #[test]
    fn test_empty_env_override_ignored() {
        let mut config: AggregatorConfig = toml::from_str(MINIMAL).unwrap();
        config.apply_overrides(Some(String::new()), None).unwrap();
        assert!(config.chain.private_key.is_none());
    }

    #[test]
    fn test_malformed_boj_key_rejected() {
        let mut config: AggregatorConfig = toml::from_str(MINIMAL).unwrap();
        let err = config
            .apply_overrides(None, Some("not-hex".into()))
            .unwrap_err();
        assert!(err.to_string().contains(BOJ_PRIVATE_KEY_ENV));
    }
}

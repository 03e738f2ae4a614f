//! Layered configuration.
//!
//! Values are merged in order: built-in defaults, `Arbor.toml` (or the file
//! given with `--config`), `ARBOR_*` environment variables (`__` separates
//! nested keys, e.g. `ARBOR_CONFIRMATION__TIMEOUT_SECS=60`), then the
//! `--network` selection.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "Arbor.toml";

/// Fixed gas price of the built-in networks (1 gwei).
pub const DEFAULT_GAS_PRICE_WEI: u64 = 1_000_000_000;

/// Networks known without any configuration file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum KnownNetwork {
    BlastMainnet,
    BlastSepolia,
    BlastLocal,
}

impl KnownNetwork {
    pub fn config(&self) -> NetworkConfig {
        let (rpc_url, chain_id) = match self {
            KnownNetwork::BlastMainnet => ("https://rpc.blast.io", Some(81457)),
            KnownNetwork::BlastSepolia => ("https://sepolia.blast.io", Some(168587773)),
            // Local nodes pick their own chain id
            KnownNetwork::BlastLocal => ("http://localhost:8545", None),
        };

        NetworkConfig {
            rpc_url: Url::parse(rpc_url).expect("built-in network URLs are valid"),
            chain_id,
            gas_price: GasPricePolicy::Fixed {
                wei: DEFAULT_GAS_PRICE_WEI,
            },
            gas_multiplier_percent: default_gas_multiplier_percent(),
        }
    }
}

/// How the gas price of submitted transactions is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum GasPricePolicy {
    Fixed { wei: u64 },
    /// Ask the node (`eth_gasPrice`) before each submission.
    Node,
}

/// Connection settings of one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: Url,
    /// Expected chain id. Checked against the node when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default = "default_gas_price")]
    pub gas_price: GasPricePolicy,
    /// Gas limit = estimate * multiplier / 100.
    #[serde(default = "default_gas_multiplier_percent")]
    pub gas_multiplier_percent: u64,
}

fn default_gas_price() -> GasPricePolicy {
    GasPricePolicy::Fixed {
        wei: DEFAULT_GAS_PRICE_WEI,
    }
}

fn default_gas_multiplier_percent() -> u64 {
    120
}

/// A multiplier below this would set the gas limit under the node's estimate.
pub const MIN_GAS_MULTIPLIER_PERCENT: u64 = 100;

/// Inclusion polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    /// Consecutive polls where the node does not know a submitted transaction
    /// before it is reported as dropped.
    pub drop_grace_polls: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            timeout_secs: 300,
            drop_grace_polls: 5,
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bounded retry of read-only RPC calls. Submissions are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArborConfig {
    /// Name of the active network.
    pub network: String,
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Compiler output directory searched for artifacts.
    pub artifacts: PathBuf,
    pub confirmation: ConfirmationConfig,
    pub retry: RetryConfig,
}

impl Default for ArborConfig {
    fn default() -> Self {
        use strum::IntoEnumIterator;

        Self {
            network: KnownNetwork::BlastLocal.to_string(),
            networks: KnownNetwork::iter()
                .map(|network| (network.to_string(), network.config()))
                .collect(),
            artifacts: PathBuf::from("artifacts"),
            confirmation: ConfirmationConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ArborConfig {
    /// Load the layered configuration.
    ///
    /// An explicit `path` must exist; the default `Arbor.toml` is optional.
    pub fn load(path: Option<&Path>, network: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ArborConfig::default()));

        figment = match path {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Configuration file {} does not exist", path.display());
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        figment = figment.merge(
            Env::prefixed("ARBOR_")
                .split("__")
                .ignore(&["config", "verbosity", "plan"]),
        );

        if let Some(network) = network {
            figment = figment.merge(Serialized::default("network", network));
        }

        let config: ArborConfig = figment
            .extract()
            .context("Failed to load configuration")?;

        config.active_network()?;
        for (name, network) in &config.networks {
            if network.gas_multiplier_percent < MIN_GAS_MULTIPLIER_PERCENT {
                anyhow::bail!(
                    "Network `{name}`: gas_multiplier_percent must be at least \
                     {MIN_GAS_MULTIPLIER_PERCENT}, got {}",
                    network.gas_multiplier_percent
                );
            }
        }

        tracing::debug!(
            network = %config.network,
            artifacts = %config.artifacts.display(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Settings of the selected network.
    pub fn active_network(&self) -> Result<&NetworkConfig> {
        self.networks.get(&self.network).with_context(|| {
            format!(
                "Unknown network `{}` (known: {})",
                self.network,
                self.networks
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_builtin_networks() {
        let config = ArborConfig::default();

        assert_eq!(config.network, "blast-local");
        assert_eq!(config.networks.len(), 3);

        let sepolia = &config.networks["blast-sepolia"];
        assert_eq!(sepolia.rpc_url.as_str(), "https://sepolia.blast.io/");
        assert_eq!(sepolia.chain_id, Some(168587773));
        assert_eq!(sepolia.gas_price, GasPricePolicy::Fixed { wei: 1_000_000_000 });

        assert_eq!(config.networks["blast-mainnet"].chain_id, Some(81457));
        assert_eq!(config.active_network().unwrap().chain_id, None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new("arbor-config").unwrap();
        let path = dir.path().join("Arbor.toml");
        std::fs::write(
            &path,
            r#"
            network = "devnet"
            artifacts = "out"

            [networks.devnet]
            rpc_url = "http://127.0.0.1:9545"
            chain_id = 31337
            gas_price = { policy = "node" }

            [confirmation]
            timeout_secs = 30
            "#,
        )
        .unwrap();

        let config = ArborConfig::load(Some(&path), None).unwrap();

        assert_eq!(config.network, "devnet");
        assert_eq!(config.artifacts, PathBuf::from("out"));
        assert_eq!(config.confirmation.timeout_secs, 30);
        assert_eq!(config.confirmation.poll_interval_ms, 2_000);
        // Built-in networks stay available next to the file's own
        assert!(config.networks.contains_key("blast-sepolia"));

        let devnet = config.active_network().unwrap();
        assert_eq!(devnet.chain_id, Some(31337));
        assert_eq!(devnet.gas_price, GasPricePolicy::Node);
        assert_eq!(devnet.gas_multiplier_percent, 120);
    }

    #[test]
    fn test_network_override() {
        let dir = TempDir::new("arbor-config").unwrap();
        let path = dir.path().join("Arbor.toml");
        std::fs::write(&path, "network = \"blast-local\"\n").unwrap();

        let config = ArborConfig::load(Some(&path), Some("blast-sepolia")).unwrap();
        assert_eq!(config.network, "blast-sepolia");
    }

    #[test]
    fn test_unknown_network_rejected() {
        let dir = TempDir::new("arbor-config").unwrap();
        let path = dir.path().join("Arbor.toml");
        std::fs::write(&path, "").unwrap();

        let err = ArborConfig::load(Some(&path), Some("moonbase")).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown network `moonbase`"));
    }

    #[test]
    fn test_gas_multiplier_below_estimate_rejected() {
        let dir = TempDir::new("arbor-config").unwrap();
        let path = dir.path().join("Arbor.toml");
        std::fs::write(
            &path,
            r#"
            [networks.devnet]
            rpc_url = "http://127.0.0.1:9545"
            gas_multiplier_percent = 80
            "#,
        )
        .unwrap();

        let err = ArborConfig::load(Some(&path), None).unwrap_err();
        assert!(
            format!("{err:#}").contains("gas_multiplier_percent must be at least 100, got 80")
        );

        std::fs::write(
            &path,
            r#"
            [networks.devnet]
            rpc_url = "http://127.0.0.1:9545"
            gas_multiplier_percent = 100
            "#,
        )
        .unwrap();
        let config = ArborConfig::load(Some(&path), Some("devnet")).unwrap();
        assert_eq!(config.active_network().unwrap().gas_multiplier_percent, 100);
    }

    #[test]
    fn test_missing_explicit_file_rejected() {
        let dir = TempDir::new("arbor-config").unwrap();
        assert!(ArborConfig::load(Some(&dir.path().join("absent.toml")), None).is_err());
    }
}

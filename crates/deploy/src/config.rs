//! Layered run configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file
//! (`Townhall.toml` unless a path is given), `TOWNHALL_*` environment
//! variables, and explicit overrides from the command line.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifacts::ArtifactStore,
    errors::DeployError,
    network::{DEFAULT_TOKEN_ADDRESS, NetworkRegistry, NetworkRule},
    pipeline::PipelineOptions,
    plan::{ConfirmationPolicy, DeploymentPlan},
    report::DEFAULT_VERIFY_TEMPLATE,
    rpc::{DEFAULT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT, JsonRpcConfig},
};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "Townhall.toml";

/// Prefix of the environment variables read into [`DeployConfig`].
pub const ENV_PREFIX: &str = "TOWNHALL_";

/// Default local JSON-RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Everything a run needs to know, after all sources are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Target network identifier, e.g. `sepolia` or `mainnet`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub rpc_url: String,
    /// Node-managed account that sends every transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,
    pub artifacts_dir: PathBuf,
    /// Defaults to `deployments/<network>.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    pub confirmation_policy: ConfirmationPolicy,
    /// Fixed gas price in wei. Held as `u64` since figment has no `u128`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_address: Option<Address>,
    pub verify_template: String,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    /// Per-network rules layered over the built-in registry.
    pub networks: BTreeMap<String, NetworkRule>,
    pub default_address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<DeploymentPlan>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            sender: None,
            artifacts_dir: PathBuf::from("artifacts"),
            manifest_path: None,
            confirmation_policy: ConfirmationPolicy::default(),
            gas_price: None,
            dependency_address: None,
            verify_template: DEFAULT_VERIFY_TEMPLATE.to_string(),
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT.as_secs(),
            receipt_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            networks: BTreeMap::new(),
            default_address: DEFAULT_TOKEN_ADDRESS,
            plan: None,
        }
    }
}

/// Values given explicitly on the command line. Unset fields leave lower
/// layers untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_policy: Option<ConfirmationPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_template: Option<String>,
}

impl DeployConfig {
    /// The merged figment for `path` (or [`DEFAULT_CONFIG_FILE`]) plus `overrides`.
    pub fn figment(path: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
    }

    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, DeployError> {
        if let Some(path) = path.filter(|p| !p.exists()) {
            return Err(DeployError::Config(format!(
                "config file does not exist: {}",
                path.display()
            )));
        }

        let config: Self = Self::figment(path, overrides)
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))?;
        config.validate()?;

        tracing::debug!(
            network = ?config.network,
            rpc_url = %config.rpc_url,
            policy = %config.confirmation_policy,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.network.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(DeployError::Config("network must not be empty".to_string()));
        }
        self.rpc_url()?;
        if self.receipt_poll_interval_ms == 0 {
            return Err(DeployError::Config(
                "receipt_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.receipt_timeout() < self.poll_interval() {
            return Err(DeployError::Config(
                "receipt_timeout_secs must cover at least one poll interval".to_string(),
            ));
        }
        if self.default_address.is_zero() {
            return Err(DeployError::Config(
                "default_address must not be the zero address".to_string(),
            ));
        }
        if let Some(plan) = &self.plan {
            plan.graph()?;
        }
        Ok(())
    }

    /// The target network. Required for a deployment.
    pub fn network(&self) -> Result<&str, DeployError> {
        self.network
            .as_deref()
            .ok_or_else(|| DeployError::Config("no network given".to_string()))
    }

    pub fn sender(&self) -> Result<Address, DeployError> {
        self.sender
            .ok_or_else(|| DeployError::Config("no sender account given".to_string()))
    }

    pub fn rpc_url(&self) -> Result<Url, DeployError> {
        Url::parse(&self.rpc_url)
            .map_err(|e| DeployError::Config(format!("invalid rpc_url '{}': {e}", self.rpc_url)))
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    /// Where the manifest of a run against `network` is written.
    pub fn manifest_path(&self) -> Result<PathBuf, DeployError> {
        match &self.manifest_path {
            Some(path) => Ok(path.clone()),
            None => Ok(PathBuf::from("deployments").join(format!("{}.json", self.network()?))),
        }
    }

    /// The built-in registry with this configuration's rules layered on top.
    pub fn registry(&self) -> NetworkRegistry {
        let mut registry = NetworkRegistry {
            default_address: self.default_address,
            ..NetworkRegistry::default()
        };
        registry.merge(self.networks.clone());
        registry
    }

    pub fn plan(&self) -> DeploymentPlan {
        self.plan.clone().unwrap_or_default()
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::from_dir(&self.artifacts_dir)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            policy: self.confirmation_policy,
            gas_price: self.gas_price.map(u128::from),
            dependency_address: self.dependency_address,
        }
    }

    pub fn rpc_config(&self) -> Result<JsonRpcConfig, DeployError> {
        Ok(JsonRpcConfig {
            receipt_timeout: self.receipt_timeout(),
            poll_interval: self.poll_interval(),
            ..JsonRpcConfig::new(self.rpc_url()?, self.sender()?)
        })
    }
}

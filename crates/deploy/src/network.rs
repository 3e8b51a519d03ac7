//! Per-network resolution of the dependency (token) address.
//!
//! Which address a run feeds to its artifacts depends on the target network.
//! Networks are data in a [`NetworkRegistry`]: adding one is a new entry, not
//! a new branch.

use std::{collections::BTreeMap, str::FromStr};

use alloy_core::primitives::{Address, TxHash, address};
use serde::{Deserialize, Serialize};

use crate::{
    artifacts::ArtifactStore,
    client::{ChainClient, DeploymentRequest},
    errors::DeployError,
};

/// Artifact deployed as a disposable stand-in on test-like networks.
pub const DEFAULT_MOCK_ARTIFACT: &str = "MockToken";

/// Production networks. Their token address is verified out of band and must be
/// configured as a fixed rule; they never fall back to the default address.
pub const PRODUCTION_NETWORKS: [&str; 1] = ["mainnet"];

/// Token address used for any network without an explicit rule.
pub const DEFAULT_TOKEN_ADDRESS: Address = address!("7af963cf6d228e564e2a0aa0ddbf06210b38615d");

/// How a given network obtains the dependency address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NetworkRule {
    /// Test-like network: deploy a throwaway mock and use its address.
    Mock {
        #[serde(default = "default_mock_artifact")]
        artifact: String,
    },
    /// Production network: use a known address.
    Fixed { address: Address },
}

fn default_mock_artifact() -> String {
    DEFAULT_MOCK_ARTIFACT.to_string()
}

impl NetworkRule {
    pub fn mock() -> Self {
        Self::Mock {
            artifact: default_mock_artifact(),
        }
    }
}

/// The decision for one run. Exactly one branch is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DependencyResolution {
    DeployMock { artifact: String },
    UseFixedAddress { address: Address },
    UseProvidedAddress { address: Address },
}

/// Record of the mock deployment made during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockDeployment {
    pub artifact: String,
    pub nonce: u64,
    pub tx_hash: TxHash,
    pub gas_price: u128,
}

/// An established dependency: the resolution and the address it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub resolution: DependencyResolution,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<MockDeployment>,
}

/// Known networks and their rules, plus the fallback address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRegistry {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkRule>,
    pub default_address: Address,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        for name in ["sepolia", "goerli", "holesky", "mainnet-fork"] {
            networks.insert(name.to_string(), NetworkRule::mock());
        }

        Self {
            networks,
            default_address: DEFAULT_TOKEN_ADDRESS,
        }
    }
}

impl NetworkRegistry {
    /// Add or replace the rule for `network`.
    pub fn with_rule(mut self, network: impl Into<String>, rule: NetworkRule) -> Self {
        self.networks.insert(network.into(), rule);
        self
    }

    /// Layer `overrides` on top of this registry.
    pub fn merge(&mut self, overrides: BTreeMap<String, NetworkRule>) {
        self.networks.extend(overrides);
    }

    /// Production networks that still lack a fixed rule.
    pub fn unconfigured_production(&self) -> impl Iterator<Item = &'static str> + '_ {
        PRODUCTION_NETWORKS
            .into_iter()
            .filter(move |name| !self.networks.contains_key(*name))
    }

    /// Decide how to obtain the dependency address for `network`.
    ///
    /// An operator-supplied address always wins. Otherwise the network's rule
    /// applies, and unlisted networks fall back to the default address. A
    /// production network without a rule is an error.
    pub fn resolve(
        &self,
        network: &str,
        provided: Option<Address>,
    ) -> Result<DependencyResolution, DeployError> {
        if let Some(address) = provided {
            return Ok(DependencyResolution::UseProvidedAddress { address });
        }

        match self.networks.get(network) {
            Some(NetworkRule::Mock { artifact }) => Ok(DependencyResolution::DeployMock {
                artifact: artifact.clone(),
            }),
            Some(NetworkRule::Fixed { address }) => {
                Ok(DependencyResolution::UseFixedAddress { address: *address })
            }
            None if PRODUCTION_NETWORKS.contains(&network) => {
                Err(DeployError::Resolution(format!(
                    "`{network}` is a production network with no token address configured; \
                     add a fixed rule under [networks.{network}] or pass --dependency-address"
                )))
            }
            None => {
                tracing::debug!(network, "No rule for network, using default address");
                Ok(DependencyResolution::UseFixedAddress {
                    address: self.default_address,
                })
            }
        }
    }
}

/// Parse a `0x`-prefixed, 40 hex character account address.
pub fn parse_address(raw: &str) -> Result<Address, DeployError> {
    if !raw.starts_with("0x") || raw.len() != 42 {
        return Err(DeployError::Resolution(format!(
            "invalid address format: expected 0x-prefixed 40 hex chars, got '{raw}'"
        )));
    }

    Address::from_str(raw)
        .map_err(|e| DeployError::Resolution(format!("invalid address '{raw}': {e}")))
}

/// Turn a resolution into a usable address.
///
/// The mock branch deploys and waits for confirmation here, before the
/// pipeline captures its base nonce, so the two never compete for a nonce.
pub async fn establish<C: ChainClient>(
    resolution: DependencyResolution,
    client: &C,
    sender: Address,
    artifacts: &mut ArtifactStore,
    gas_price: u128,
) -> Result<ResolvedDependency, DeployError> {
    let (address, mock) = match &resolution {
        DependencyResolution::UseFixedAddress { address }
        | DependencyResolution::UseProvidedAddress { address } => (*address, None),
        DependencyResolution::DeployMock { artifact } => {
            let (address, record) =
                deploy_mock(artifact, client, sender, artifacts, gas_price).await?;
            (address, Some(record))
        }
    };

    if address.is_zero() {
        return Err(DeployError::Resolution(
            "dependency resolved to the zero address".to_string(),
        ));
    }

    tracing::info!(
        resolution = ?resolution,
        address = %address,
        "Dependency resolved"
    );

    Ok(ResolvedDependency {
        resolution,
        address,
        mock,
    })
}

async fn deploy_mock<C: ChainClient>(
    artifact: &str,
    client: &C,
    sender: Address,
    artifacts: &mut ArtifactStore,
    gas_price: u128,
) -> Result<(Address, MockDeployment), DeployError> {
    let resolution_err = |cause: String| DeployError::Resolution(format!("{artifact}: {cause}"));

    let init_code = artifacts
        .bytecode(artifact)
        .map_err(|e| resolution_err(e.to_string()))?;
    let nonce = client
        .transaction_count(sender)
        .await
        .map_err(|e| resolution_err(e.to_string()))?;

    tracing::info!(artifact, nonce, "Deploying mock dependency");

    let tx_hash = client
        .send_deployment(DeploymentRequest {
            artifact: artifact.to_string(),
            init_code,
            nonce,
            gas_price,
        })
        .await
        .map_err(|e| resolution_err(format!("submission failed: {e}")))?;

    let receipt = client
        .wait_for_receipt(tx_hash)
        .await
        .map_err(|e| resolution_err(format!("not confirmed: {e}")))?;

    if !receipt.success {
        return Err(resolution_err(format!("deployment {tx_hash} reverted")));
    }

    let address = receipt
        .contract_address
        .ok_or_else(|| resolution_err(format!("receipt for {tx_hash} has no contract address")))?;

    Ok((
        address,
        MockDeployment {
            artifact: artifact.to_string(),
            nonce,
            tx_hash,
            gas_price,
        },
    ))
}

//! The deployment manifest: what a run submitted, what confirmed, and where.
//!
//! A manifest is written after every run, successful or not. For a failed run
//! it is the operator's recovery record: it lists confirmed artifacts as well
//! as transactions that were submitted but never confirmed.

use std::path::Path;

use alloy_core::primitives::{Address, TxHash};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{network::ResolvedDependency, plan::ArgValue};

/// Lifecycle of a deployment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

/// Outcome of one deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub artifact: String,
    pub args: Vec<ArgValue>,
    pub nonce: u64,
    pub gas_price: u128,
    /// Absent if submission itself failed.
    pub tx_hash: Option<TxHash>,
    /// Known only once the step is confirmed.
    pub address: Option<Address>,
    pub status: StepStatus,
}

impl DeploymentResult {
    pub fn is_confirmed(&self) -> bool {
        self.status == StepStatus::Confirmed && self.address.is_some()
    }
}

/// Outcome of a linking call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingAction {
    pub target: String,
    pub target_address: Address,
    pub new_owner: String,
    pub new_owner_address: Address,
    pub function: String,
    pub nonce: u64,
    pub tx_hash: Option<TxHash>,
    pub status: StepStatus,
}

/// Everything a run did, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub network: String,
    pub deployer: Address,
    pub created_at: DateTime<Utc>,
    /// Nonce the sequenced part of the run started from.
    pub base_nonce: Option<u64>,
    pub gas_price: Option<u128>,
    pub dependency: Option<ResolvedDependency>,
    pub steps: Vec<DeploymentResult>,
    pub links: Vec<LinkingAction>,
    /// True only if every step confirmed and every link succeeded.
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentManifest {
    pub fn new(network: impl Into<String>, deployer: Address) -> Self {
        Self {
            network: network.into(),
            deployer,
            created_at: Utc::now(),
            base_nonce: None,
            gas_price: None,
            dependency: None,
            steps: Vec::new(),
            links: Vec::new(),
            complete: false,
            error: None,
        }
    }

    /// The result recorded for `artifact`, if it got as far as submission.
    pub fn step(&self, artifact: &str) -> Option<&DeploymentResult> {
        self.steps.iter().find(|s| s.artifact == artifact)
    }

    /// The confirmed address of `artifact`.
    pub fn address_of(&self, artifact: &str) -> Option<Address> {
        self.step(artifact).filter(|s| s.is_confirmed()).and_then(|s| s.address)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.steps.iter().filter(|s| s.is_confirmed())
    }

    /// Steps that were submitted but never confirmed.
    pub fn in_flight(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.steps.iter().filter(|s| s.status == StepStatus::Submitted)
    }

    /// Nonces of every sequenced transaction (steps, then links), in submission order.
    pub fn nonces(&self) -> Vec<u64> {
        self.steps
            .iter()
            .map(|s| s.nonce)
            .chain(self.links.iter().map(|l| l.nonce))
            .collect()
    }

    /// Save the manifest as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write manifest to {}", path.display()))?;

        tracing::info!(path = %path.display(), complete = self.complete, "Manifest saved");
        Ok(())
    }

    /// Load a manifest previously written by [`Self::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Manifest file does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse manifest JSON")
    }
}

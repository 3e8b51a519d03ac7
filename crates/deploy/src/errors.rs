//! Error taxonomy for a deployment run.
//!
//! Every variant is fatal to the run. Nothing here is retried automatically:
//! a retry would have to re-derive a nonce, which could double-submit or
//! desynchronize transactions that are already pending.

use alloy_core::primitives::TxHash;

use crate::manifest::DeploymentManifest;

/// Errors surfaced by the network-client seam.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The node refused the transaction because its nonce was already used.
    #[error("nonce rejected by node: {0}")]
    NonceConflict(String),
    /// A submitted transaction did not confirm within the client's bound.
    #[error("transaction {0} was not confirmed in time")]
    Timeout(TxHash),
    /// Any other transport or RPC failure.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Errors that abort a deployment run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The dependency address could not be established.
    #[error("dependency resolution failed: {0}")]
    Resolution(String),

    /// The account's on-chain nonce diverged from the sequencer.
    ///
    /// `observed` is `None` when the node rejected the nonce on submission
    /// rather than the divergence being seen up front.
    #[error(
        "nonce conflict at step `{step}`: expected {expected}, {}",
        .observed.map_or_else(|| "rejected by node".to_string(), |o| format!("observed {o}"))
    )]
    NonceConflict {
        step: String,
        expected: u64,
        observed: Option<u64>,
    },

    /// A deployment step failed to submit or confirm.
    #[error("step `{step}` failed: {cause}")]
    Pipeline { step: String, cause: String },

    /// The ownership transfer was rejected or referenced an unconfirmed artifact.
    #[error("linking `{target}` failed: {cause}")]
    Linking { target: String, cause: String },

    /// The deployment plan is malformed.
    #[error("invalid deployment plan: {0}")]
    Plan(String),

    /// A compiled artifact could not be loaded.
    #[error("artifact `{name}`: {cause}")]
    Artifact { name: String, cause: String },

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DeployError {
    pub(crate) fn pipeline(step: impl Into<String>, cause: impl ToString) -> Self {
        Self::Pipeline {
            step: step.into(),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn linking(target: impl Into<String>, cause: impl ToString) -> Self {
        Self::Linking {
            target: target.into(),
            cause: cause.to_string(),
        }
    }
}

/// A failed run, carrying whatever the run had recorded before it stopped.
///
/// The manifest lists confirmed steps as well as steps that were submitted but
/// never confirmed, so an operator can pick up from where the run halted.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: DeployError,
    pub manifest: Box<DeploymentManifest>,
}

impl RunFailure {
    pub fn new(error: DeployError, manifest: DeploymentManifest) -> Self {
        Self {
            error,
            manifest: Box::new(manifest),
        }
    }
}

//! townhall-deploy - Deployment library for the TownHall contracts.
//!
//! This crate resolves the token dependency for a target network, deploys an
//! ordered plan of contracts with pipelined nonces, links them together, and
//! records everything in a manifest.

mod artifacts;
pub use artifacts::{ArtifactStore, parse_bytecode};

mod client;
pub use client::{CallRequest, ChainClient, DeploymentRequest, Receipt};

mod config;
pub use config::{ConfigOverrides, DEFAULT_CONFIG_FILE, DEFAULT_RPC_URL, DeployConfig, ENV_PREFIX};

mod errors;
pub use errors::{ClientError, DeployError, RunFailure};

pub mod link;
pub use link::link_calldata;

mod manifest;
pub use manifest::{DeploymentManifest, DeploymentResult, LinkingAction, StepStatus};

mod network;
pub use network::{
    DEFAULT_MOCK_ARTIFACT, DEFAULT_TOKEN_ADDRESS, DependencyResolution, MockDeployment,
    NetworkRegistry, NetworkRule, PRODUCTION_NETWORKS, ResolvedDependency, establish,
    parse_address,
};

mod nonce;
pub use nonce::NonceSequencer;

mod pipeline;
pub use pipeline::{DeploymentPipeline, NetworkContext, PipelineOptions};

mod plan;
pub use plan::{
    ArgValue, ConfirmationPolicy, ConstructorArg, DEFAULT_LINK_FUNCTION, DependencyGraph,
    DeploymentPlan, LinkSpec, StepSpec, encode_constructor_args,
};

mod report;
pub use report::{DEFAULT_VERIFY_TEMPLATE, Report, render, verify_command};

pub mod rpc;
pub use rpc::{JsonRpcClient, JsonRpcConfig};

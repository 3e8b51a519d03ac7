use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use townhall_deploy::{ConfigOverrides, ConfirmationPolicy, parse_address};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "townhall")]
#[command(
    author,
    version,
    about = "Deploy and link the TownHall contracts on any network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        global = true,
        env = "TOWNHALL_VERBOSITY",
        default_value_t = LevelFilter::INFO
    )]
    pub verbosity: LevelFilter,

    /// Path to a configuration file.
    ///
    /// Defaults to ./Townhall.toml when it exists.
    #[arg(long, alias = "conf", global = true, env = "TOWNHALL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the deployment plan and write its manifest.
    Deploy(DeployArgs),
    /// Render a previously written manifest.
    Report(ReportArgs),
    /// List the known networks and how each resolves the token address.
    Networks,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// The target network, e.g. sepolia or mainnet.
    #[arg(short, long)]
    pub network: Option<String>,

    /// The URL of the JSON-RPC endpoint.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// The node-managed account that sends every transaction.
    #[arg(long, alias = "from")]
    pub sender: Option<Address>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, alias = "artifacts")]
    pub artifacts_dir: Option<PathBuf>,

    /// Where to write the deployment manifest.
    ///
    /// If not provided, the manifest is written to ./deployments/<network>.json
    #[arg(long, alias = "out")]
    pub manifest: Option<PathBuf>,

    /// When to block on confirmations: every-step or on-demand.
    #[arg(long, alias = "policy")]
    pub confirmation_policy: Option<ConfirmationPolicy>,

    /// Fixed gas price in wei. If not provided, the node's gas price is used.
    #[arg(long)]
    pub gas_price: Option<u64>,

    /// Use this token address instead of the network's rule.
    #[arg(long, alias = "token", value_parser = parse_address)]
    pub dependency_address: Option<Address>,

    /// Verification command template ({network}, {address} and {args}).
    #[arg(long)]
    pub verify_template: Option<String>,
}

impl DeployArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            network: self.network.clone(),
            rpc_url: self.rpc_url.clone(),
            sender: self.sender,
            artifacts_dir: self.artifacts_dir.clone(),
            manifest_path: self.manifest.clone(),
            confirmation_policy: self.confirmation_policy,
            gas_price: self.gas_price,
            dependency_address: self.dependency_address,
            verify_template: self.verify_template.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    /// The manifest to render. Defaults to the configured manifest path.
    pub manifest: Option<PathBuf>,

    /// The network whose default manifest path should be used.
    #[arg(short, long)]
    pub network: Option<String>,

    /// Verification command template ({network}, {address} and {args}).
    #[arg(long)]
    pub verify_template: Option<String>,

    /// Only print the verification commands.
    #[arg(long)]
    pub commands_only: bool,
}

impl ReportArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            network: self.network.clone(),
            manifest_path: self.manifest.clone(),
            verify_template: self.verify_template.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_args() {
        let cli = Cli::try_parse_from([
            "townhall",
            "deploy",
            "--network",
            "sepolia",
            "--policy",
            "every-step",
            "--dependency-address",
            "0xdddddddddddddddddddddddddddddddddddddddd",
            "--gas-price",
            "1000000000",
        ])
        .expect("valid arguments");

        let Command::Deploy(args) = cli.command else {
            panic!("expected the deploy subcommand");
        };
        let overrides = args.overrides();
        assert_eq!(overrides.network.as_deref(), Some("sepolia"));
        assert_eq!(overrides.confirmation_policy, Some(ConfirmationPolicy::EveryStep));
        assert_eq!(overrides.gas_price, Some(1_000_000_000));
        assert!(overrides.dependency_address.is_some());
        assert!(overrides.sender.is_none());
    }

    #[test]
    fn test_rejects_malformed_dependency_address() {
        let result = Cli::try_parse_from([
            "townhall",
            "deploy",
            "--dependency-address",
            "dddddddddddddddddddddddddddddddddddddddd",
        ]);
        assert!(result.is_err());
    }
}

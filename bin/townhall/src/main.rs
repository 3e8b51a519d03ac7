//! townhall deploys the TownHall contracts and hands them their dependencies.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs, ReportArgs};
use townhall_deploy::{
    DeployConfig, DeployError, DeploymentManifest, DeploymentPipeline, JsonRpcClient,
    NetworkContext, NetworkRule, RunFailure, render,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Deploy(args) => deploy(config_path, args).await,
        Command::Report(args) => report(config_path, args),
        Command::Networks => networks(config_path),
    }
}

async fn deploy(config_path: Option<&Path>, args: DeployArgs) -> Result<()> {
    let config = DeployConfig::load(config_path, &args.overrides())
        .context("Failed to load configuration")?;

    let network = config.network()?.to_string();
    let manifest_path = config.manifest_path()?;
    let client = JsonRpcClient::new(config.rpc_config()?)
        .context("Failed to create the JSON-RPC client")?;

    tracing::info!(
        network = %network,
        rpc_url = %config.rpc_url,
        sender = %client.sender(),
        manifest = %manifest_path.display(),
        "Deploying..."
    );

    let ctx = NetworkContext::new(&network, client.sender(), client);
    let mut pipeline = DeploymentPipeline::new(config.plan(), config.registry(), config.artifacts())
        .with_options(config.pipeline_options());

    let (manifest, failure) = match pipeline.run(&ctx).await {
        Ok(manifest) => (manifest, None),
        Err(RunFailure { error, manifest }) => (*manifest, Some(error)),
    };

    println!("{}", render(&manifest, &config.verify_template));
    conclude(&manifest, failure, &manifest_path)
}

/// Write the manifest and surface the outcome of the run.
///
/// A failed run reports its own error even when the manifest cannot be written.
fn conclude(
    manifest: &DeploymentManifest,
    failure: Option<DeployError>,
    manifest_path: &Path,
) -> Result<()> {
    // The manifest is written either way; for a failed run it is the recovery record.
    let saved = manifest.save_to_file(manifest_path);

    let Some(error) = failure else {
        return saved.context("Failed to write the deployment manifest");
    };

    let network = &manifest.network;
    match saved {
        Ok(()) => Err(anyhow::Error::new(error).context(format!(
            "Deployment on {network} did not complete, partial manifest written to {}",
            manifest_path.display()
        ))),
        Err(save_error) => {
            tracing::error!(
                manifest = %manifest_path.display(),
                error = %format!("{save_error:#}"),
                "Failed to write the partial manifest"
            );
            Err(anyhow::Error::new(error).context(format!(
                "Deployment on {network} did not complete, partial manifest was not written"
            )))
        }
    }
}

fn report(config_path: Option<&Path>, args: ReportArgs) -> Result<()> {
    let config = DeployConfig::load(config_path, &args.overrides())
        .context("Failed to load configuration")?;
    let manifest_path = config.manifest_path()?;

    let manifest = DeploymentManifest::load_from_file(&manifest_path)?;
    let report = render(&manifest, &config.verify_template);

    if args.commands_only {
        for command in &report.verification_commands {
            println!("{command}");
        }
    } else {
        println!("{report}");
    }

    Ok(())
}

fn networks(config_path: Option<&Path>) -> Result<()> {
    let config = DeployConfig::load(config_path, &Default::default())
        .context("Failed to load configuration")?;
    let registry = config.registry();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Network", "Token"]);

    for (name, rule) in &registry.networks {
        let token = match rule {
            NetworkRule::Mock { artifact } => format!("deploy mock {artifact}"),
            NetworkRule::Fixed { address } => address.to_string(),
        };
        table.add_row(vec![name.clone(), token]);
    }
    for name in registry.unconfigured_production() {
        table.add_row(vec![
            name.to_string(),
            "fixed address not configured".to_string(),
        ]);
    }
    table.add_row(vec![
        "(any other)".to_string(),
        registry.default_address.to_string(),
    ]);

    println!("{table}");
    Ok(())
}

//! Human-readable rendering of a [`DeploymentManifest`].
//!
//! Rendering is read-only: it never touches the network.

use std::fmt::Write as _;

use alloy_core::primitives::Address;
use comfy_table::{Table, presets::UTF8_FULL};

use crate::{
    manifest::DeploymentManifest,
    network::DependencyResolution,
    plan::ArgValue,
};

/// Default source-verification command.
pub const DEFAULT_VERIFY_TEMPLATE: &str =
    "npx hardhat verify --network {network} {address} {args}";

/// Rendered output of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Fenced `Name: address` block followed by a status table.
    pub human_summary: String,
    /// One shell command per confirmed artifact.
    pub verification_commands: Vec<String>,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.human_summary)?;
        if !self.verification_commands.is_empty() {
            writeln!(f, "\nVerification:")?;
            for command in &self.verification_commands {
                writeln!(f, "  {command}")?;
            }
        }
        Ok(())
    }
}

/// Fill a verification template for one artifact.
pub fn verify_command(
    template: &str,
    network: &str,
    address: Address,
    args: &[ArgValue],
) -> String {
    let args = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    template
        .replace("{network}", network)
        .replace("{address}", &format!("{address:#x}"))
        .replace("{args}", &args)
        .trim_end()
        .to_string()
}

/// Render `manifest` with the given verification template.
pub fn render(manifest: &DeploymentManifest, template: &str) -> Report {
    let mut addresses = Vec::new();
    let mut verification_commands = Vec::new();

    if let Some(dependency) = &manifest.dependency {
        let name = match &dependency.resolution {
            DependencyResolution::DeployMock { artifact } => artifact.as_str(),
            _ => "Dependency",
        };
        addresses.push((name.to_string(), dependency.address));

        // Only a freshly deployed mock is ours to verify.
        if dependency.mock.is_some() {
            verification_commands.push(verify_command(
                template,
                &manifest.network,
                dependency.address,
                &[],
            ));
        }
    }

    for step in manifest.confirmed() {
        let Some(address) = step.address else {
            continue;
        };
        addresses.push((step.artifact.clone(), address));
        verification_commands.push(verify_command(
            template,
            &manifest.network,
            address,
            &step.args,
        ));
    }

    let mut summary = String::new();
    let _ = writeln!(summary, "Network: {}", manifest.network);
    let _ = writeln!(summary, "Deployer: {}", manifest.deployer);
    let _ = writeln!(summary, "```");
    for (name, address) in &addresses {
        let _ = writeln!(summary, "{name}: {address}");
    }
    let _ = writeln!(summary, "```");
    let _ = write!(summary, "{}", status_table(manifest));

    if !manifest.complete {
        let reason = manifest.error.as_deref().unwrap_or("run did not finish");
        let _ = write!(summary, "\nIncomplete deployment: {reason}");
    }

    Report {
        human_summary: summary,
        verification_commands,
    }
}

fn status_table(manifest: &DeploymentManifest) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Name", "Nonce", "Transaction", "Address", "Status"]);

    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    for step in &manifest.steps {
        table.add_row(vec![
            step.artifact.clone(),
            step.nonce.to_string(),
            or_dash(step.tx_hash.map(|h| h.to_string())),
            or_dash(step.address.map(|a| a.to_string())),
            step.status.to_string(),
        ]);
    }

    for link in &manifest.links {
        table.add_row(vec![
            format!("{} -> {}", link.target, link.new_owner),
            link.nonce.to_string(),
            or_dash(link.tx_hash.map(|h| h.to_string())),
            link.target_address.to_string(),
            link.status.to_string(),
        ]);
    }

    table
}

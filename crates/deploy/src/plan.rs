//! Deployment plans and the dependency graph derived from them.
//!
//! A plan is an ordered list of artifacts to create, each with constructor
//! arguments that may reference an earlier artifact's address, followed by
//! linking calls. When the pipeline has to wait for a confirmation is derived
//! from those references, not written by hand.

use std::{collections::HashMap, fmt};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Default signature of the linking call.
pub const DEFAULT_LINK_FUNCTION: &str = "transferOwnership(address)";

/// A constructor argument as written in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ConstructorArg {
    /// The resolved dependency address.
    Dependency,
    /// The confirmed address of an earlier step.
    Step(String),
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
}

impl ConstructorArg {
    pub fn step(name: impl Into<String>) -> Self {
        Self::Step(name.into())
    }
}

/// A constructor argument with every reference replaced by its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
}

impl ArgValue {
    fn to_sol(&self) -> DynSolValue {
        match self {
            ArgValue::Address(a) => DynSolValue::Address(*a),
            ArgValue::Uint(u) => DynSolValue::Uint(*u, 256),
            ArgValue::Bool(b) => DynSolValue::Bool(*b),
            ArgValue::String(s) => DynSolValue::String(s.clone()),
        }
    }
}

/// Echoes the value the way verification tooling expects it on a command line.
impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Address(a) => write!(f, "{a:#x}"),
            ArgValue::Uint(u) => write!(f, "{u}"),
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::String(s) => write!(f, "{}", shell_quote(s)),
        }
    }
}

/// Single-quote `s` for a POSIX shell. Nothing inside is expanded.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// ABI-encode constructor arguments as they are appended to creation bytecode.
pub fn encode_constructor_args(args: &[ArgValue]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(ArgValue::to_sol).collect()).abi_encode_params()
}

/// One artifact to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub artifact: String,
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

impl StepSpec {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ConstructorArg) -> Self {
        self.args.push(arg);
        self
    }
}

/// A post-deployment call on `target`, passing `new_owner`'s address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub target: String,
    pub new_owner: String,
    #[serde(default = "default_link_function")]
    pub function: String,
}

fn default_link_function() -> String {
    DEFAULT_LINK_FUNCTION.to_string()
}

impl LinkSpec {
    /// Transfer ownership of `target` to `new_owner`.
    pub fn transfer_ownership(target: impl Into<String>, new_owner: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            new_owner: new_owner.into(),
            function: default_link_function(),
        }
    }
}

/// When to block on a step's confirmation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConfirmationPolicy {
    /// Confirm every step before submitting the next one.
    EveryStep,
    /// Submit back-to-back and wait only when a later step needs an address.
    #[default]
    OnDemand,
}

/// Ordered deployment steps plus the linking calls that follow them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

impl Default for DeploymentPlan {
    /// `Building`, then `TownHall(Building, token)`, then hand `Building` to `TownHall`.
    fn default() -> Self {
        Self {
            steps: vec![
                StepSpec::new("Building"),
                StepSpec::new("TownHall")
                    .arg(ConstructorArg::step("Building"))
                    .arg(ConstructorArg::Dependency),
            ],
            links: vec![LinkSpec::transfer_ownership("Building", "TownHall")],
        }
    }
}

/// Step-to-step references of a validated plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    /// For each step, the earlier steps whose addresses it consumes.
    pub deps: Vec<Vec<usize>>,
    /// For each step, whether any later step or link consumes its address.
    pub consumed: Vec<bool>,
    /// For each link, the `(target, new_owner)` step indices.
    pub links: Vec<(usize, usize)>,
}

impl DeploymentPlan {
    /// Number of nonces a full run consumes: one per step and one per link.
    pub fn transaction_count(&self) -> usize {
        self.steps.len() + self.links.len()
    }

    /// Check the plan and derive its dependency graph.
    ///
    /// Steps may only reference steps that come before them, which also rules
    /// out cycles.
    pub fn graph(&self) -> Result<DependencyGraph, DeployError> {
        if self.steps.is_empty() {
            return Err(DeployError::Plan("plan has no steps".to_string()));
        }

        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut deps = Vec::with_capacity(self.steps.len());
        let mut consumed = vec![false; self.steps.len()];

        for (index, step) in self.steps.iter().enumerate() {
            if step.artifact.is_empty() {
                return Err(DeployError::Plan(format!("step {index} has no artifact name")));
            }

            let mut step_deps = Vec::new();
            for arg in &step.args {
                let ConstructorArg::Step(name) = arg else {
                    continue;
                };
                let dep = *positions.get(name.as_str()).ok_or_else(|| {
                    DeployError::Plan(format!(
                        "`{}` references `{name}`, which is not an earlier step",
                        step.artifact
                    ))
                })?;
                consumed[dep] = true;
                if !step_deps.contains(&dep) {
                    step_deps.push(dep);
                }
            }
            deps.push(step_deps);

            if positions.insert(step.artifact.as_str(), index).is_some() {
                return Err(DeployError::Plan(format!(
                    "artifact `{}` appears more than once",
                    step.artifact
                )));
            }
        }

        let mut links = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let lookup = |name: &str| {
                positions.get(name).copied().ok_or_else(|| {
                    DeployError::Plan(format!("link references unknown step `{name}`"))
                })
            };
            let target = lookup(&link.target)?;
            let new_owner = lookup(&link.new_owner)?;
            if target == new_owner {
                return Err(DeployError::Plan(format!(
                    "link on `{}` points at itself",
                    link.target
                )));
            }
            validate_link_function(&link.function)?;
            consumed[target] = true;
            consumed[new_owner] = true;
            links.push((target, new_owner));
        }

        Ok(DependencyGraph {
            deps,
            consumed,
            links,
        })
    }
}

/// The linking call takes exactly one `address` parameter.
fn validate_link_function(signature: &str) -> Result<(), DeployError> {
    let valid = signature.strip_suffix("(address)").is_some_and(|name| {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });

    if valid {
        Ok(())
    } else {
        Err(DeployError::Plan(format!(
            "link function `{signature}` must have the form `name(address)`"
        )))
    }
}

//! The deployment pipeline.
//!
//! A run goes through four phases:
//!
//! 1. Resolve the dependency address (may deploy and confirm a mock).
//! 2. Capture the base nonce. This happens strictly after resolution so a
//!    mock deployment can never shift the sequence.
//! 3. Create every artifact in plan order, each with the next sequenced
//!    nonce. Under [`ConfirmationPolicy::OnDemand`] a step is only awaited
//!    when a later step needs its address; independent steps go out
//!    back-to-back.
//! 4. Once every artifact is confirmed, submit the linking calls with the
//!    following nonces.
//!
//! The first failure halts the run. Nothing is retried, and transactions
//! already in flight are left alone and reported in the manifest.

use alloy_core::primitives::Address;

use crate::{
    artifacts::ArtifactStore,
    client::{ChainClient, DeploymentRequest},
    errors::{ClientError, DeployError, RunFailure},
    link,
    manifest::{DeploymentManifest, DeploymentResult, StepStatus},
    network::{self, NetworkRegistry, ResolvedDependency},
    nonce::NonceSequencer,
    plan::{
        ArgValue, ConfirmationPolicy, ConstructorArg, DependencyGraph, DeploymentPlan,
        encode_constructor_args,
    },
};

/// The target of a run: which network, which account, and how to reach it.
#[derive(Debug, Clone)]
pub struct NetworkContext<C> {
    pub network: String,
    pub sender: Address,
    pub client: C,
}

impl<C: ChainClient> NetworkContext<C> {
    pub fn new(network: impl Into<String>, sender: Address, client: C) -> Self {
        Self {
            network: network.into(),
            sender,
            client,
        }
    }
}

/// Knobs that change how a run behaves, not what it deploys.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub policy: ConfirmationPolicy,
    /// Fixed gas price in wei. Read from the node when absent.
    pub gas_price: Option<u128>,
    /// Operator-supplied dependency address, overriding the network rule.
    pub dependency_address: Option<Address>,
}

/// A configured deployment, ready to run against a [`NetworkContext`].
#[derive(Debug, Clone)]
pub struct DeploymentPipeline {
    plan: DeploymentPlan,
    registry: NetworkRegistry,
    artifacts: ArtifactStore,
    options: PipelineOptions,
}

impl DeploymentPipeline {
    pub fn new(plan: DeploymentPlan, registry: NetworkRegistry, artifacts: ArtifactStore) -> Self {
        Self {
            plan,
            registry,
            artifacts,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    pub fn gas_price(mut self, gas_price: u128) -> Self {
        self.options.gas_price = Some(gas_price);
        self
    }

    pub fn dependency_address(mut self, address: Address) -> Self {
        self.options.dependency_address = Some(address);
        self
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    /// Execute the plan.
    ///
    /// On failure the returned [`RunFailure`] carries the partial manifest.
    pub async fn run<C: ChainClient>(
        &mut self,
        ctx: &NetworkContext<C>,
    ) -> Result<DeploymentManifest, RunFailure> {
        let mut manifest = DeploymentManifest::new(&ctx.network, ctx.sender);

        tracing::info!(
            network = %ctx.network,
            sender = %ctx.sender,
            policy = %self.options.policy,
            steps = self.plan.steps.len(),
            links = self.plan.links.len(),
            "Starting deployment pipeline"
        );

        match self.execute(ctx, &mut manifest).await {
            Ok(()) => {
                manifest.complete = true;
                tracing::info!(network = %ctx.network, "Deployment pipeline complete");
                Ok(manifest)
            }
            Err(error) => {
                tracing::error!(%error, "Deployment pipeline halted");
                for step in manifest.in_flight() {
                    tracing::warn!(
                        step = %step.artifact,
                        nonce = step.nonce,
                        tx_hash = ?step.tx_hash,
                        "Submitted transaction left unconfirmed"
                    );
                }
                manifest.error = Some(error.to_string());
                Err(RunFailure::new(error, manifest))
            }
        }
    }

    async fn execute<C: ChainClient>(
        &mut self,
        ctx: &NetworkContext<C>,
        manifest: &mut DeploymentManifest,
    ) -> Result<(), DeployError> {
        let graph = self.plan.graph()?;
        let client = &ctx.client;

        let gas_price = match self.options.gas_price {
            Some(price) => price,
            None => client
                .gas_price()
                .await
                .map_err(|e| DeployError::pipeline("gas-price", e))?,
        };
        manifest.gas_price = Some(gas_price);

        let resolution = self
            .registry
            .resolve(&ctx.network, self.options.dependency_address)?;
        let dependency =
            network::establish(resolution, client, ctx.sender, &mut self.artifacts, gas_price)
                .await?;
        manifest.dependency = Some(dependency.clone());

        let mut sequencer = NonceSequencer::capture(client, ctx.sender).await?;
        manifest.base_nonce = Some(sequencer.base());

        let mut steps = StepRunner {
            client,
            sender: ctx.sender,
            gas_price,
            dependency: &dependency,
            sequencer: &mut sequencer,
            manifest,
        };

        for index in 0..self.plan.steps.len() {
            for &dep in &graph.deps[index] {
                steps.confirm(dep).await?;
            }

            steps.submit(&self.plan, index, &mut self.artifacts).await?;

            if self.options.policy == ConfirmationPolicy::EveryStep {
                steps.confirm(index).await?;
            }
        }

        // Consumed outputs first, in plan order, then anything still in flight.
        for index in order_for_confirmation(&graph) {
            steps.confirm(index).await?;
        }

        for (link_spec, &(target, new_owner)) in self.plan.links.iter().zip(&graph.links) {
            let (target, new_owner) = (
                steps.manifest.steps[target].clone(),
                steps.manifest.steps[new_owner].clone(),
            );

            let step_name = format!("link:{}", target.artifact);
            steps
                .sequencer
                .ensure_in_sync(client, ctx.sender, &step_name)
                .await?;
            let nonce = steps.sequencer.next();

            let mut action = link::submit_link(
                client,
                &target,
                &new_owner,
                &link_spec.function,
                nonce,
                gas_price,
            )
            .await?;
            let confirmed = link::confirm_link(client, &mut action).await;
            steps.manifest.links.push(action);
            confirmed?;
        }

        Ok(())
    }
}

/// Steps whose output is consumed come first so a failure there surfaces
/// before waiting on independent steps.
fn order_for_confirmation(graph: &DependencyGraph) -> Vec<usize> {
    let (mut consumed, independent): (Vec<usize>, Vec<usize>) =
        (0..graph.consumed.len()).partition(|&i| graph.consumed[i]);
    consumed.extend(independent);
    consumed
}

/// Mutable state of the artifact phase of a run.
struct StepRunner<'a, C> {
    client: &'a C,
    sender: Address,
    gas_price: u128,
    dependency: &'a ResolvedDependency,
    sequencer: &'a mut NonceSequencer,
    manifest: &'a mut DeploymentManifest,
}

impl<C: ChainClient> StepRunner<'_, C> {
    /// Replace references with confirmed values. Never substitutes a placeholder.
    fn resolve_args(
        &self,
        plan: &DeploymentPlan,
        index: usize,
    ) -> Result<Vec<ArgValue>, DeployError> {
        let step = &plan.steps[index];

        step.args
            .iter()
            .map(|arg| match arg {
                ConstructorArg::Dependency => Ok(ArgValue::Address(self.dependency.address)),
                ConstructorArg::Step(name) => self
                    .manifest
                    .address_of(name)
                    .map(ArgValue::Address)
                    .ok_or_else(|| {
                        DeployError::pipeline(
                            &step.artifact,
                            format!("constructor argument `{name}` is not confirmed"),
                        )
                    }),
                ConstructorArg::Address(a) => Ok(ArgValue::Address(*a)),
                ConstructorArg::Uint(u) => Ok(ArgValue::Uint(*u)),
                ConstructorArg::Bool(b) => Ok(ArgValue::Bool(*b)),
                ConstructorArg::String(s) => Ok(ArgValue::String(s.clone())),
            })
            .collect()
    }

    async fn submit(
        &mut self,
        plan: &DeploymentPlan,
        index: usize,
        artifacts: &mut ArtifactStore,
    ) -> Result<(), DeployError> {
        let artifact = plan.steps[index].artifact.clone();
        let args = self.resolve_args(plan, index)?;

        let mut init_code = artifacts
            .bytecode(&artifact)
            .map_err(|e| DeployError::pipeline(&artifact, e))?
            .to_vec();
        init_code.extend_from_slice(&encode_constructor_args(&args));

        self.sequencer
            .ensure_in_sync(self.client, self.sender, &artifact)
            .await?;
        let nonce = self.sequencer.next();

        tracing::info!(step = %artifact, nonce, args = args.len(), "Submitting deployment");

        let mut result = DeploymentResult {
            artifact: artifact.clone(),
            args,
            nonce,
            gas_price: self.gas_price,
            tx_hash: None,
            address: None,
            status: StepStatus::Pending,
        };

        let sent = self
            .client
            .send_deployment(DeploymentRequest {
                artifact: artifact.clone(),
                init_code: init_code.into(),
                nonce,
                gas_price: self.gas_price,
            })
            .await;

        match sent {
            Ok(tx_hash) => {
                tracing::info!(step = %artifact, nonce, tx_hash = %tx_hash, "Deployment submitted");
                result.tx_hash = Some(tx_hash);
                result.status = StepStatus::Submitted;
                self.manifest.steps.push(result);
                Ok(())
            }
            Err(e) => {
                result.status = StepStatus::Failed;
                self.manifest.steps.push(result);
                Err(match e {
                    ClientError::NonceConflict(_) => DeployError::NonceConflict {
                        step: artifact,
                        expected: nonce,
                        observed: None,
                    },
                    e => DeployError::pipeline(artifact, format!("submission failed: {e}")),
                })
            }
        }
    }

    /// Block until step `index` is confirmed. A no-op if it already is.
    async fn confirm(&mut self, index: usize) -> Result<(), DeployError> {
        let step = &self.manifest.steps[index];
        if step.status == StepStatus::Confirmed {
            return Ok(());
        }

        let artifact = step.artifact.clone();
        let tx_hash = step.tx_hash.ok_or_else(|| {
            DeployError::pipeline(&artifact, "cannot confirm a step that was never submitted")
        })?;

        tracing::debug!(step = %artifact, tx_hash = %tx_hash, "Waiting for confirmation");

        let outcome = match self.client.wait_for_receipt(tx_hash).await {
            Err(e) => Err(format!("not confirmed: {e}")),
            Ok(receipt) if !receipt.success => Err(format!("deployment {tx_hash} reverted")),
            Ok(receipt) => receipt
                .contract_address
                .ok_or_else(|| format!("receipt for {tx_hash} has no contract address")),
        };

        let step = &mut self.manifest.steps[index];
        match outcome {
            Ok(address) => {
                step.address = Some(address);
                step.status = StepStatus::Confirmed;
                tracing::info!(step = %artifact, address = %address, "Deployment confirmed");
                Ok(())
            }
            Err(cause) => {
                step.status = StepStatus::Failed;
                Err(DeployError::pipeline(artifact, cause))
            }
        }
    }
}

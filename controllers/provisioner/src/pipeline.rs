//! Batch provisioning pipeline
//!
//! Every node runs Create, WaitReady, ConfigureBoot, Deploy, WaitDeployed,
//! credential update, VerifyConnectivity and (optionally) storage layout.
//! Creation runs for the whole batch first; the remaining stages are then
//! dispatched across a second pool of the same size. A node that fails a
//! stage gets its terminal status and skips everything after it.

use crate::cloud_init::{encode_user_data, CloudInitGenerator};
use crate::connectivity::{verify_connectivity, ReachabilityProbe};
use crate::error::ProvisionError;
use crate::logging::StorageLog;
use crate::poller::{wait_for, WaitPolicy};
use crate::state::{NodeLifecycle, NodeRuntimeState};
use crate::storage_layout;
use crate::worker_pool::WorkerPool;
use inventory::{Batch, DeploymentStatus, LayoutTemplate, NodeDescriptor};
use maas_client::{CreateMachineRequest, MaasClientTrait, MachineStatus, PowerCredentials, PowerParameters};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Wait policies for the timed stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimings {
    /// Commissioning, until MAAS reports Ready
    pub ready: WaitPolicy,
    /// Deployment, until MAAS reports Deployed
    pub deployed: WaitPolicy,
    /// SSH reachability after deployment
    pub connectivity: WaitPolicy,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            ready: WaitPolicy::from_secs(600, 30),
            deployed: WaitPolicy::from_secs(1200, 60),
            connectivity: WaitPolicy::from_secs(30, 5),
        }
    }
}

/// Storage layout settings, present when layout reconstruction is enabled
#[derive(Debug, Clone)]
pub struct StorageLayoutOptions {
    /// Batch template; a node's own template reference takes precedence
    pub template: Option<PathBuf>,
    /// Directory holding one log file per node
    pub log_dir: PathBuf,
}

/// Settings shared by every node of a batch
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Batch cloud-init template; a node's own template takes precedence
    pub cloud_init_template: Option<PathBuf>,
    /// Where rendered per-node cloud-init files are written
    pub artifact_dir: PathBuf,
    /// Keep rendered cloud-init files after deployment
    pub preserve_artifacts: bool,
    /// `None` skips layout reconstruction
    pub storage_layout: Option<StorageLayoutOptions>,
    pub timings: PipelineTimings,
}

/// Terminal status of every node plus per-status counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Hostname and status, in batch order
    pub statuses: Vec<(String, DeploymentStatus)>,
    pub counts: BTreeMap<DeploymentStatus, usize>,
}

impl BatchReport {
    /// Nodes that never reached a terminal status count as Deploy Failed
    pub fn from_states(states: &[NodeRuntimeState]) -> Self {
        let mut report = BatchReport::default();
        for state in states {
            let status = state.deployment_status.unwrap_or(DeploymentStatus::DeployFailed);
            report.statuses.push((state.hostname.clone(), status));
            *report.counts.entry(status).or_default() += 1;
        }
        report
    }

    /// Number of nodes that ended with `status`
    pub fn count(&self, status: DeploymentStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or_default()
    }

    /// Log the totals per status
    pub fn log_summary(&self) {
        info!("Batch finished: {} nodes", self.statuses.len());
        for (status, count) in &self.counts {
            info!("  {}: {}", status, count);
        }
    }
}

/// Shared, read-only context of one pipeline run
struct Context {
    client: Arc<dyn MaasClientTrait>,
    probe: Arc<dyn ReachabilityProbe>,
    generator: CloudInitGenerator,
    options: PipelineOptions,
}

/// Drives a batch of nodes through every provisioning stage
pub struct ProvisioningPipeline {
    context: Arc<Context>,
    pool: WorkerPool,
}

impl std::fmt::Debug for ProvisioningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningPipeline")
            .field("profile", &self.context.client.profile())
            .field("workers", &self.pool.limit())
            .field("options", &self.context.options)
            .finish()
    }
}

impl ProvisioningPipeline {
    /// Build a pipeline running at most `max_workers` nodes at a time
    pub fn new(
        client: Arc<dyn MaasClientTrait>,
        probe: Arc<dyn ReachabilityProbe>,
        max_workers: usize,
        options: PipelineOptions,
    ) -> Self {
        Self {
            context: Arc::new(Context {
                client,
                probe,
                generator: CloudInitGenerator::new(&options.artifact_dir),
                options,
            }),
            pool: WorkerPool::new(max_workers),
        }
    }

    /// Provision every node of `batch`, recording each terminal status in its row
    pub async fn provision_batch(&self, batch: &mut Batch) -> BatchReport {
        let nodes: Vec<NodeDescriptor> = batch.nodes().cloned().collect();
        let states = self.run(nodes).await;
        for (index, state) in states.iter().enumerate() {
            if let Some(status) = state.deployment_status {
                batch.set_status(index, status);
            }
        }
        BatchReport::from_states(&states)
    }

    /// Run both phases and return the final state of every node, in input order
    pub async fn run(&self, nodes: Vec<NodeDescriptor>) -> Vec<NodeRuntimeState> {
        info!("Creating {} machines with {} workers", nodes.len(), self.pool.limit());
        let created = self
            .pool
            .run(nodes.clone(), |node| {
                let context = self.context.clone();
                let span = info_span!("node", hostname = %node.hostname);
                async move { create_node(context.as_ref(), &node).await }.instrument(span)
            })
            .await;

        let pending: Vec<(NodeDescriptor, NodeRuntimeState)> = nodes
            .into_iter()
            .zip(created)
            .map(|(node, state)| {
                let state = state.unwrap_or_else(|| abandoned(&node.hostname, DeploymentStatus::SystemIdMissing));
                (node, state)
            })
            .collect();
        let hostnames: Vec<String> = pending.iter().map(|(node, _)| node.hostname.clone()).collect();

        info!("Deploying machines");
        let finished = self
            .pool
            .run(pending, |(node, state)| {
                let context = self.context.clone();
                let span = info_span!("node", hostname = %node.hostname);
                async move { deploy_node(context.as_ref(), &node, state).await }.instrument(span)
            })
            .await;

        hostnames
            .iter()
            .zip(finished)
            .map(|(hostname, state)| state.unwrap_or_else(|| abandoned(hostname, DeploymentStatus::DeployFailed)))
            .collect()
    }
}

/// State for a node whose worker died
fn abandoned(hostname: &str, status: DeploymentStatus) -> NodeRuntimeState {
    let mut state = NodeRuntimeState::new(hostname);
    if let Err(e) = state.fail("worker failed", status) {
        error!("[{}] {}", hostname, e);
    }
    state
}

fn create_request(node: &NodeDescriptor) -> CreateMachineRequest {
    CreateMachineRequest {
        hostname: node.hostname.clone(),
        architecture: node.architecture.clone(),
        mac_addresses: node.mac_addresses.clone(),
        power_type: node.power_type.clone(),
        power_parameters: PowerParameters {
            power_user: node.power.user.clone(),
            power_pass: node.power.pass.clone(),
            power_driver: node.power.driver.clone(),
            power_address: node.power.address.clone(),
            extras: node.power.extras.clone(),
        },
    }
}

async fn create_node(context: &Context, node: &NodeDescriptor) -> NodeRuntimeState {
    let mut state = NodeRuntimeState::new(&node.hostname);
    if let Err(e) = try_create(context, node, &mut state).await {
        error!("[{}] {}", node.hostname, e);
        state.finish(DeploymentStatus::SystemIdMissing);
    }
    state
}

async fn try_create(context: &Context, node: &NodeDescriptor, state: &mut NodeRuntimeState) -> Result<(), ProvisionError> {
    state.transition(NodeLifecycle::Creating)?;
    match context.client.create_machine(&create_request(node)).await {
        Ok(machine) => {
            info!("[{}] Machine created ({}).", node.hostname, machine.system_id);
            state.system_id = Some(machine.system_id);
            state.transition(NodeLifecycle::Created)
        }
        Err(e) => {
            error!("[{}] Error creating machine: {}", node.hostname, e);
            state.fail("creation error", DeploymentStatus::SystemIdMissing)
        }
    }
}

async fn deploy_node(context: &Context, node: &NodeDescriptor, mut state: NodeRuntimeState) -> NodeRuntimeState {
    let Some(system_id) = state.system_id.clone() else {
        warn!("[{}] Skipping: no system_id.", node.hostname);
        state.finish(DeploymentStatus::SystemIdMissing);
        return state;
    };

    if let Err(e) = run_stages(context, node, &system_id, &mut state).await {
        error!("[{}] {}", node.hostname, e);
        state.finish(DeploymentStatus::DeployFailed);
    }

    if let Some(artifact) = state.artifact.take() {
        if context.options.preserve_artifacts {
            state.artifact = Some(artifact);
        } else {
            remove_artifact(&node.hostname, &artifact).await;
        }
    }
    state
}

async fn remove_artifact(hostname: &str, path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("[{}] Failed to remove temp cloud-init file: {}", hostname, e);
        }
    }
}

async fn wait_for_status(
    client: &Arc<dyn MaasClientTrait>,
    system_id: &str,
    target: MachineStatus,
    failure_values: &[MachineStatus],
    policy: WaitPolicy,
) -> bool {
    let accessor = || {
        let client = client.clone();
        let system_id = system_id.to_string();
        async move {
            match client.read_status(&system_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Status read failed: {}", e);
                    MachineStatus::Unknown
                }
            }
        }
    };
    wait_for(accessor, &target, failure_values, policy.timeout, policy.interval).await
}

/// Stages after creation. Stage failures are recorded in `state` and end the
/// run with `Ok`; `Err` only signals a lifecycle bug.
async fn run_stages(
    context: &Context,
    node: &NodeDescriptor,
    system_id: &str,
    state: &mut NodeRuntimeState,
) -> Result<(), ProvisionError> {
    let timings = context.options.timings;
    let hostname = node.hostname.as_str();

    state.transition(NodeLifecycle::WaitingReady)?;
    let ready = wait_for_status(
        &context.client,
        system_id,
        MachineStatus::Ready,
        &[MachineStatus::FailedCommissioning, MachineStatus::Unknown],
        timings.ready,
    )
    .await;
    if !ready {
        warn!("[{}] Not Ready. Skipping deployment.", hostname);
        return state.fail("not ready", DeploymentStatus::NotReady);
    }
    state.transition(NodeLifecycle::Ready)?;

    state.transition(NodeLifecycle::ConfiguringBoot)?;
    let template = node
        .cloud_init_template
        .as_ref()
        .or(context.options.cloud_init_template.as_ref());
    let Some(template) = template else {
        error!("[{}] No cloud-init template for this node.", hostname);
        return state.fail("no cloud-init template", DeploymentStatus::DeployFailed);
    };
    let artifact = match context.generator.generate(template, node).await {
        Ok(path) => path,
        Err(e) => {
            error!("[{}] Cloud-init generation failed: {}", hostname, e);
            return state.fail("cloud-init generation failed", DeploymentStatus::DeployFailed);
        }
    };
    state.artifact = Some(artifact.clone());

    state.transition(NodeLifecycle::Deploying)?;
    let deployed = match encode_user_data(&artifact).await {
        Ok(user_data) => context
            .client
            .deploy_machine(system_id, &user_data)
            .await
            .map_err(ProvisionError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = deployed {
        error!("[{}] Deploy failed: {}", hostname, e);
        // Removed even when artifacts are preserved
        if let Some(artifact) = state.artifact.take() {
            remove_artifact(hostname, &artifact).await;
        }
        return state.fail("deploy failed", DeploymentStatus::DeployFailed);
    }
    info!("[{}] Deploy triggered with cloud-init.", hostname);

    state.transition(NodeLifecycle::WaitingDeployed)?;
    let deployed = wait_for_status(
        &context.client,
        system_id,
        MachineStatus::Deployed,
        &[MachineStatus::FailedDeployment, MachineStatus::Unknown],
        timings.deployed,
    )
    .await;
    if !deployed {
        let timeout = ProvisionError::TimeoutExceeded {
            stage: MachineStatus::Deployed.to_string(),
            timeout_secs: timings.deployed.timeout.as_secs(),
        };
        warn!("[{}] Did not reach Deployed state: {}", hostname, timeout);
        return state.fail("deployment timeout", DeploymentStatus::DeploymentTimeout);
    }
    state.transition(NodeLifecycle::Deployed)?;
    info!("[{}] Deployment completed.", hostname);

    let credentials = PowerCredentials {
        power_user: node.power.user.clone(),
        power_pass: node.power.pass.clone(),
    };
    if let Err(e) = context.client.update_power_credentials(system_id, &credentials).await {
        warn!("[{}] Failed to update IPMI user: {}", hostname, e);
    }

    info!("[{}] checking connectivity.", hostname);
    state.transition(NodeLifecycle::VerifyingConnectivity)?;
    match verify_connectivity(context.probe.as_ref(), hostname, &node.ip, timings.connectivity).await {
        Ok(_) => {
            state.transition(NodeLifecycle::Reachable)?;
            state.finish(DeploymentStatus::Deployed);
        }
        Err(e) => {
            warn!("[{}] {}", hostname, e);
            state.transition(NodeLifecycle::Unreachable)?;
            state.finish(DeploymentStatus::DeployedUnreachable);
        }
    }

    if let Some(layout) = &context.options.storage_layout {
        configure_storage(context.client.as_ref(), node, system_id, layout).await;
    }
    Ok(())
}

/// Storage layout for a deployed node; failures stay in the node's storage log
async fn configure_storage(client: &dyn MaasClientTrait, node: &NodeDescriptor, system_id: &str, options: &StorageLayoutOptions) {
    let hostname = node.hostname.as_str();
    info!("{}: MAAS storage configuration started", hostname);

    let log = match StorageLog::create(&options.log_dir, hostname) {
        Ok(log) => log,
        Err(e) => {
            error!("[{}] Cannot open storage log: {}", hostname, e);
            return;
        }
    };

    let Some(template_path) = node.storage_layout_template.as_ref().or(options.template.as_ref()) else {
        log.error("No storage layout template for this node");
        return;
    };
    let template = match LayoutTemplate::load(template_path) {
        Ok(template) => template,
        Err(e) => {
            log.error(format!("Cannot load layout template {}: {}", template_path.display(), e));
            return;
        }
    };

    storage_layout::configure_node(client, system_id, &template, &log).await;
}

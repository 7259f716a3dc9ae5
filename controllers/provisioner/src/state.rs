//! Per-node runtime state
//!
//! Each node moves forward through its lifecycle exactly once; `transition`
//! refuses to go backwards or to leave a terminal state.

use crate::error::ProvisionError;
use inventory::DeploymentStatus;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeLifecycle {
    Pending,
    Creating,
    Created,
    WaitingReady,
    Ready,
    ConfiguringBoot,
    Deploying,
    WaitingDeployed,
    Deployed,
    VerifyingConnectivity,
    Reachable,
    Unreachable,
    Failed(String),
}

impl NodeLifecycle {
    fn rank(&self) -> u8 {
        match self {
            NodeLifecycle::Pending => 0,
            NodeLifecycle::Creating => 1,
            NodeLifecycle::Created => 2,
            NodeLifecycle::WaitingReady => 3,
            NodeLifecycle::Ready => 4,
            NodeLifecycle::ConfiguringBoot => 5,
            NodeLifecycle::Deploying => 6,
            NodeLifecycle::WaitingDeployed => 7,
            NodeLifecycle::Deployed => 8,
            NodeLifecycle::VerifyingConnectivity => 9,
            NodeLifecycle::Reachable | NodeLifecycle::Unreachable => 10,
            NodeLifecycle::Failed(_) => 11,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeLifecycle::Reachable | NodeLifecycle::Unreachable | NodeLifecycle::Failed(_)
        )
    }

    /// True when `next` may follow `self`
    pub fn can_advance_to(&self, next: &NodeLifecycle) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            // Any live stage may fail
            NodeLifecycle::Failed(_) => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for NodeLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeLifecycle::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Mutable state of one node, owned by the worker processing it
#[derive(Debug, Clone)]
pub struct NodeRuntimeState {
    pub hostname: String,
    pub system_id: Option<String>,
    pub lifecycle: NodeLifecycle,
    /// Every lifecycle state visited, in order
    pub history: Vec<NodeLifecycle>,
    pub deployment_status: Option<DeploymentStatus>,
    /// Rendered cloud-init document, while it exists
    pub artifact: Option<PathBuf>,
}

impl NodeRuntimeState {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            system_id: None,
            lifecycle: NodeLifecycle::Pending,
            history: vec![NodeLifecycle::Pending],
            deployment_status: None,
            artifact: None,
        }
    }

    /// Move to `next`, recording it in the history
    pub fn transition(&mut self, next: NodeLifecycle) -> Result<(), ProvisionError> {
        if !self.lifecycle.can_advance_to(&next) {
            return Err(ProvisionError::InvalidTransition {
                from: self.lifecycle.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("[{}] {} -> {}", self.hostname, self.lifecycle, next);
        self.history.push(next.clone());
        self.lifecycle = next;
        Ok(())
    }

    /// Enter `Failed(reason)` and record the terminal status
    pub fn fail(&mut self, reason: &str, status: DeploymentStatus) -> Result<(), ProvisionError> {
        self.transition(NodeLifecycle::Failed(reason.to_string()))?;
        self.finish(status);
        Ok(())
    }

    /// Record the terminal status; only the first one sticks
    pub fn finish(&mut self, status: DeploymentStatus) {
        if self.deployment_status.is_none() {
            self.deployment_status = Some(status);
        }
    }

    pub fn visited(&self, state: &NodeLifecycle) -> bool {
        self.history.contains(state)
    }
}

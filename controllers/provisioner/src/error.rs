//! Provisioner error types.
//!
//! Per-node failures are recorded as a node's terminal status and never
//! surface here; these errors cover batch-level failures and the internal
//! results that stages map to a status.

use inventory::InventoryError;
use maas_client::MaasError;
use thiserror::Error;

/// Errors that can occur while provisioning a batch.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// MAAS CLI call failed
    #[error("MAAS error: {0}")]
    MaasClient(#[from] MaasError),

    /// Batch input or layout template could not be read
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Malformed size string in a layout template
    #[error("Invalid size string format: {0}")]
    InvalidSizeFormat(String),

    /// A wait stage's deadline elapsed
    #[error("Timed out after {timeout_secs}s waiting for {stage}")]
    TimeoutExceeded { stage: String, timeout_secs: u64 },

    /// Reachability probe retries exhausted
    #[error("{host} not reachable after {waited_secs}s")]
    ConnectivityUnverified { host: String, waited_secs: u64 },

    /// Template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Local file operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Onboarding toolchain hand-off failed
    #[error("Onboarding failed: {0}")]
    Onboarding(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lifecycle moved backwards
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl ProvisionError {
    /// Fold size-format errors from the inventory crate into their own variant
    pub fn from_inventory(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidSizeFormat(text) => ProvisionError::InvalidSizeFormat(text),
            other => ProvisionError::Inventory(other),
        }
    }
}

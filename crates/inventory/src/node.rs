//! Node descriptors and terminal deployment status

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Protocol-specific power fields carried through to the power parameters
/// when the batch has a column for them
pub const POWER_EXTRA_COLUMNS: &[&str] = &["cipher_suite_id", "power_boot_type", "privilege_level", "k_g"];

/// BMC access for one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSettings {
    pub user: String,
    pub pass: String,
    pub driver: String,
    pub address: String,
    /// Protocol-specific fields (IPMI cipher suite, boot type, ...)
    pub extras: BTreeMap<String, String>,
}

/// One node of a batch, as read from its input row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub hostname: String,
    pub architecture: String,
    pub mac_addresses: Vec<String>,
    pub power_type: String,
    pub power: PowerSettings,
    pub ip: String,
    pub storage_ip: Option<String>,
    /// Per-node storage layout template overriding the batch template
    pub storage_layout_template: Option<PathBuf>,
    /// Per-node cloud-init template overriding the batch template
    pub cloud_init_template: Option<PathBuf>,
}

/// Terminal outcome recorded for every node of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Deployed,
    DeployedUnreachable,
    DeploymentTimeout,
    DeployFailed,
    NotReady,
    SystemIdMissing,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 6] = [
        DeploymentStatus::Deployed,
        DeploymentStatus::DeployedUnreachable,
        DeploymentStatus::DeploymentTimeout,
        DeploymentStatus::DeployFailed,
        DeploymentStatus::NotReady,
        DeploymentStatus::SystemIdMissing,
    ];

    /// Text written to the `deployment_status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Deployed => "Deployed",
            DeploymentStatus::DeployedUnreachable => "Deployed-Unreachable",
            DeploymentStatus::DeploymentTimeout => "Deployment Timeout",
            DeploymentStatus::DeployFailed => "Deploy Failed",
            DeploymentStatus::NotReady => "Not Ready,Commissioning Was Not Done",
            DeploymentStatus::SystemIdMissing => "System ID Missing Machine Was Not Created",
        }
    }

    /// Parse the column text back into a status
    pub fn from_column(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == text.trim())
    }

    /// True when the OS deployment itself completed
    pub fn is_deployed(&self) -> bool {
        matches!(self, DeploymentStatus::Deployed | DeploymentStatus::DeployedUnreachable)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_column_text() {
        assert_eq!(DeploymentStatus::DeployedUnreachable.to_string(), "Deployed-Unreachable");
        assert_eq!(
            DeploymentStatus::SystemIdMissing.to_string(),
            "System ID Missing Machine Was Not Created"
        );
        for status in DeploymentStatus::ALL {
            assert_eq!(DeploymentStatus::from_column(status.as_str()), Some(status));
        }
        assert_eq!(DeploymentStatus::from_column("Pending"), None);
    }

    #[test]
    fn test_is_deployed() {
        assert!(DeploymentStatus::Deployed.is_deployed());
        assert!(DeploymentStatus::DeployedUnreachable.is_deployed());
        assert!(!DeploymentStatus::DeploymentTimeout.is_deployed());
        assert!(!DeploymentStatus::NotReady.is_deployed());
    }
}

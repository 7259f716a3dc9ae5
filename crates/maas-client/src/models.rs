//! MAAS API models
//!
//! These models match the JSON the MAAS CLI prints for machines and their
//! storage. Only the fields the provisioner reads are modelled; everything
//! else in the payload is ignored on deserialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Machine lifecycle status (`status_name` in MAAS)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineStatus {
    New,
    Commissioning,
    #[serde(rename = "Failed commissioning")]
    FailedCommissioning,
    Testing,
    Ready,
    Allocated,
    Deploying,
    Deployed,
    #[serde(rename = "Failed deployment")]
    FailedDeployment,
    Releasing,
    Broken,
    #[serde(other)]
    #[default]
    Unknown,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::New => "New",
            MachineStatus::Commissioning => "Commissioning",
            MachineStatus::FailedCommissioning => "Failed commissioning",
            MachineStatus::Testing => "Testing",
            MachineStatus::Ready => "Ready",
            MachineStatus::Allocated => "Allocated",
            MachineStatus::Deploying => "Deploying",
            MachineStatus::Deployed => "Deployed",
            MachineStatus::FailedDeployment => "Failed deployment",
            MachineStatus::Releasing => "Releasing",
            MachineStatus::Broken => "Broken",
            MachineStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine as returned by `machine read` / `machines create`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Machine {
    pub system_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub status_name: MachineStatus,
    #[serde(default)]
    pub boot_disk: Option<BlockDeviceRef>,
}

/// Nested block device reference (e.g. `boot_disk` on a machine)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Filesystem placed on a partition or block device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    pub fstype: String,
    #[serde(default)]
    pub mount_point: Option<String>,
}

/// Physical or virtual block device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDevice {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default)]
    pub filesystem: Option<Filesystem>,
}

/// Partition on a block device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Partition {
    pub id: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub bootable: bool,
    #[serde(default)]
    pub filesystem: Option<Filesystem>,
}

/// Volume group with the logical volumes carved from it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub logical_volumes: Vec<LogicalVolume>,
}

/// Logical volume (MAAS reports its name as `<vg>-<lv>`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogicalVolume {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// BMC parameter bundle sent as `power_parameters=<json>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerParameters {
    pub power_user: String,
    pub power_pass: String,
    pub power_driver: String,
    pub power_address: String,
    /// Protocol-specific extras (`cipher_suite_id`, `k_g`, ...)
    #[serde(flatten)]
    pub extras: BTreeMap<String, String>,
}

/// Power credentials pushed after deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerCredentials {
    pub power_user: String,
    pub power_pass: String,
}

/// Request for `machines create`
#[derive(Debug, Clone, Default)]
pub struct CreateMachineRequest {
    pub hostname: String,
    pub architecture: String,
    pub mac_addresses: Vec<String>,
    pub power_type: String,
    pub power_parameters: PowerParameters,
}

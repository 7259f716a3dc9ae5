//! Declarative storage layout templates
//!
//! A template names the volume group, the two boot partition sizes and the
//! ordered logical volumes to carve from the data partition:
//!
//! ```json
//! {
//!   "vg_group": "maas_vg",
//!   "boot_efi_size": "0.5G",
//!   "boot_size": "1G",
//!   "volumes": [
//!     { "name": "root", "size": "40G", "fs_type": "ext4", "mount_point": "/" },
//!     { "name": "swap", "size": "8G" }
//!   ]
//! }
//! ```

use crate::error::InventoryError;
use crate::size::parse_size;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_VG_GROUP: &str = "maas_vg";
pub const DEFAULT_BOOT_EFI_SIZE: &str = "0.5G";
pub const DEFAULT_BOOT_SIZE: &str = "1G";
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Volumes whose name contains "swap" are formatted as swap and never mounted
pub fn is_swap_name(name: &str) -> bool {
    name.contains("swap")
}

fn default_vg_group() -> String {
    DEFAULT_VG_GROUP.to_string()
}

fn default_boot_efi_size() -> String {
    DEFAULT_BOOT_EFI_SIZE.to_string()
}

fn default_boot_size() -> String {
    DEFAULT_BOOT_SIZE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutTemplate {
    #[serde(default = "default_vg_group")]
    pub vg_group: String,
    #[serde(default = "default_boot_efi_size")]
    pub boot_efi_size: String,
    #[serde(default = "default_boot_size")]
    pub boot_size: String,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    #[serde(default)]
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
}

impl Default for LayoutTemplate {
    fn default() -> Self {
        Self {
            vg_group: default_vg_group(),
            boot_efi_size: default_boot_efi_size(),
            boot_size: default_boot_size(),
            volumes: Vec::new(),
        }
    }
}

impl LayoutTemplate {
    /// Load a template file; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let template = if is_yaml {
            serde_yaml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };
        tracing::debug!("Loaded layout template {}", path.display());
        Ok(template)
    }

    /// Check every size string parses and the volumes fit in a single partition
    pub fn validate(&self) -> Result<(), InventoryError> {
        parse_size(&self.boot_efi_size)?;
        parse_size(&self.boot_size)?;
        self.data_partition_bytes()?;
        Ok(())
    }

    pub fn boot_efi_bytes(&self) -> Result<u64, InventoryError> {
        parse_size(&self.boot_efi_size)
    }

    pub fn boot_bytes(&self) -> Result<u64, InventoryError> {
        parse_size(&self.boot_size)
    }

    /// Size of the data partition backing the volume group: the sum of all volume sizes
    pub fn data_partition_bytes(&self) -> Result<u64, InventoryError> {
        self.volumes.iter().try_fold(0u64, |total, volume| {
            total
                .checked_add(parse_size(&volume.size)?)
                .ok_or_else(|| InventoryError::InvalidSizeFormat(format!("total of volume sizes exceeds {} bytes", u64::MAX)))
        })
    }

    /// Find a volume by the name MAAS reports for it (`<vg_group>-<name>`) or its bare name
    pub fn volume_for(&self, reported_name: &str) -> Option<&VolumeSpec> {
        let base = self.base_volume_name(reported_name);
        self.volumes.iter().find(|v| v.name == base)
    }

    /// Strip the volume group prefix from a reported logical volume name
    pub fn base_volume_name<'a>(&self, reported_name: &'a str) -> &'a str {
        reported_name
            .strip_prefix(self.vg_group.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(reported_name)
    }
}

impl VolumeSpec {
    pub fn size_bytes(&self) -> Result<u64, InventoryError> {
        parse_size(&self.size)
    }

    pub fn is_swap(&self) -> bool {
        is_swap_name(&self.name)
    }

    pub fn fs_type(&self) -> &str {
        self.fs_type.as_deref().filter(|f| !f.is_empty()).unwrap_or(DEFAULT_FS_TYPE)
    }
}

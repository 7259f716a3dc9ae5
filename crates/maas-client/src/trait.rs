//! MaasClient trait for mocking
//!
//! This trait abstracts the MAAS CLI so the provisioner can be driven by the
//! CLI-backed `MaasClient` in production and by `MockMaasClient` in tests.
//! Every method maps to exactly one CLI call.

use crate::error::MaasError;
use crate::models::*;

/// Trait for MAAS node-management operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Reads and deletes report a missing resource as an error that satisfies
/// `MaasError::is_not_found`; callers apply `NotFoundExt::or_empty` where the
/// idempotent-delete convention holds.
#[async_trait::async_trait]
pub trait MaasClientTrait: Send + Sync {
    /// MAAS CLI profile the calls are issued under
    fn profile(&self) -> &str;

    // Machine lifecycle
    async fn create_machine(&self, request: &CreateMachineRequest) -> Result<Machine, MaasError>;
    async fn read_machine(&self, system_id: &str) -> Result<Machine, MaasError>;
    async fn update_power_credentials(&self, system_id: &str, credentials: &PowerCredentials) -> Result<(), MaasError>;
    /// Trigger deployment with a base64-encoded cloud-init document
    async fn deploy_machine(&self, system_id: &str, user_data: &str) -> Result<(), MaasError>;

    /// Current lifecycle status of a machine
    async fn read_status(&self, system_id: &str) -> Result<MachineStatus, MaasError> {
        Ok(self.read_machine(system_id).await?.status_name)
    }

    // Block devices (logical volumes are block devices too)
    async fn list_block_devices(&self, system_id: &str) -> Result<Vec<BlockDevice>, MaasError>;
    async fn delete_block_device(&self, system_id: &str, device_id: u64) -> Result<(), MaasError>;
    async fn format_block_device(&self, system_id: &str, device_id: u64, fstype: &str) -> Result<(), MaasError>;
    async fn mount_block_device(&self, system_id: &str, device_id: u64, mount_point: &str) -> Result<(), MaasError>;

    // Partitions
    async fn list_partitions(&self, system_id: &str, device_id: u64) -> Result<Vec<Partition>, MaasError>;
    /// `size: None` lets MAAS use the remaining free space on the device
    async fn create_partition(&self, system_id: &str, device_id: u64, size: Option<u64>, bootable: Option<bool>) -> Result<Partition, MaasError>;
    async fn delete_partition(&self, system_id: &str, device_id: u64, partition_id: u64) -> Result<(), MaasError>;
    async fn format_partition(&self, system_id: &str, device_id: u64, partition_id: u64, fstype: &str) -> Result<(), MaasError>;
    async fn mount_partition(&self, system_id: &str, device_id: u64, partition_id: u64, mount_point: &str) -> Result<(), MaasError>;

    // Volume groups
    async fn list_volume_groups(&self, system_id: &str) -> Result<Vec<VolumeGroup>, MaasError>;
    async fn read_volume_group(&self, system_id: &str, volume_group_id: u64) -> Result<VolumeGroup, MaasError>;
    async fn create_volume_group(&self, system_id: &str, name: &str, partition_ids: &[u64]) -> Result<VolumeGroup, MaasError>;
    async fn delete_volume_group(&self, system_id: &str, volume_group_id: u64) -> Result<(), MaasError>;
    async fn create_logical_volume(&self, system_id: &str, volume_group_id: u64, name: &str, size: u64) -> Result<LogicalVolume, MaasError>;
}

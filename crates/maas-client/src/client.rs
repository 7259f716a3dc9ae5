//! MAAS CLI client
//!
//! Implements `MaasClientTrait` by shelling out to the `maas` CLI under a
//! logged-in profile and decoding its JSON output.

use crate::common::op;
use crate::common::params::Params;
use crate::common::MaasCli;
use crate::error::MaasError;
use crate::models::*;
use crate::maas_trait::MaasClientTrait;
use std::time::Duration;
use tracing::debug;

/// Default per-call timeout for CLI invocations
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// MAAS CLI client
#[derive(Debug, Clone)]
pub struct MaasClient {
    cli: MaasCli,
}

impl MaasClient {
    /// Create a new MAAS client
    ///
    /// # Arguments
    /// * `profile` - MAAS CLI profile created with `maas login`
    pub fn new(profile: impl Into<String>) -> Self {
        Self::with_binary("maas", profile, DEFAULT_CALL_TIMEOUT)
    }

    /// Create a client that runs a specific CLI binary with a custom timeout
    pub fn with_binary(binary: impl Into<String>, profile: impl Into<String>, timeout: Duration) -> Self {
        Self {
            cli: MaasCli::new(binary, profile, timeout),
        }
    }
}

#[async_trait::async_trait]
impl MaasClientTrait for MaasClient {
    fn profile(&self) -> &str {
        self.cli.profile()
    }

    async fn create_machine(&self, request: &CreateMachineRequest) -> Result<Machine, MaasError> {
        debug!("Creating machine {}", request.hostname);
        let power_parameters = serde_json::to_string(&request.power_parameters)?;
        let args = Params::new()
            .kv("hostname", &request.hostname)
            .kv("architecture", &request.architecture)
            .repeated("mac_addresses", &request.mac_addresses)
            .kv("power_type", &request.power_type)
            .kv("power_parameters", power_parameters)
            .build();
        self.cli.run_json(op::CREATE_MACHINE, &args).await
    }

    async fn read_machine(&self, system_id: &str) -> Result<Machine, MaasError> {
        let args = Params::new().id(system_id).build();
        self.cli.run_json(op::READ_MACHINE, &args).await
    }

    async fn update_power_credentials(&self, system_id: &str, credentials: &PowerCredentials) -> Result<(), MaasError> {
        let power_parameters = serde_json::to_string(credentials)?;
        let args = Params::new()
            .id(system_id)
            .kv("power_parameters", power_parameters)
            .build();
        self.cli.run_unit(op::UPDATE_MACHINE, &args).await
    }

    async fn deploy_machine(&self, system_id: &str, user_data: &str) -> Result<(), MaasError> {
        debug!("Deploying machine {}", system_id);
        let args = Params::new().id(system_id).kv("user_data", user_data).build();
        self.cli.run_unit(op::DEPLOY_MACHINE, &args).await
    }

    async fn list_block_devices(&self, system_id: &str) -> Result<Vec<BlockDevice>, MaasError> {
        let args = Params::new().id(system_id).build();
        self.cli.run_json(op::LIST_BLOCK_DEVICES, &args).await
    }

    async fn delete_block_device(&self, system_id: &str, device_id: u64) -> Result<(), MaasError> {
        let args = Params::new().id(system_id).id(device_id).build();
        self.cli.run_unit(op::DELETE_BLOCK_DEVICE, &args).await
    }

    async fn format_block_device(&self, system_id: &str, device_id: u64, fstype: &str) -> Result<(), MaasError> {
        let args = Params::new().id(system_id).id(device_id).kv("fstype", fstype).build();
        self.cli.run_unit(op::FORMAT_BLOCK_DEVICE, &args).await
    }

    async fn mount_block_device(&self, system_id: &str, device_id: u64, mount_point: &str) -> Result<(), MaasError> {
        let args = Params::new().id(system_id).id(device_id).kv("mount_point", mount_point).build();
        self.cli.run_unit(op::MOUNT_BLOCK_DEVICE, &args).await
    }

    async fn list_partitions(&self, system_id: &str, device_id: u64) -> Result<Vec<Partition>, MaasError> {
        let args = Params::new().id(system_id).id(device_id).build();
        self.cli.run_json(op::LIST_PARTITIONS, &args).await
    }

    async fn create_partition(&self, system_id: &str, device_id: u64, size: Option<u64>, bootable: Option<bool>) -> Result<Partition, MaasError> {
        let args = Params::new()
            .id(system_id)
            .id(device_id)
            .kv_opt("size", size)
            .kv_opt("bootable", bootable)
            .build();
        self.cli.run_json(op::CREATE_PARTITION, &args).await
    }

    async fn delete_partition(&self, system_id: &str, device_id: u64, partition_id: u64) -> Result<(), MaasError> {
        let args = Params::new().id(system_id).id(device_id).id(partition_id).build();
        self.cli.run_unit(op::DELETE_PARTITION, &args).await
    }

    async fn format_partition(&self, system_id: &str, device_id: u64, partition_id: u64, fstype: &str) -> Result<(), MaasError> {
        let args = Params::new()
            .id(system_id)
            .id(device_id)
            .id(partition_id)
            .kv("fstype", fstype)
            .build();
        self.cli.run_unit(op::FORMAT_PARTITION, &args).await
    }

    async fn mount_partition(&self, system_id: &str, device_id: u64, partition_id: u64, mount_point: &str) -> Result<(), MaasError> {
        let args = Params::new()
            .id(system_id)
            .id(device_id)
            .id(partition_id)
            .kv("mount_point", mount_point)
            .build();
        self.cli.run_unit(op::MOUNT_PARTITION, &args).await
    }

    async fn list_volume_groups(&self, system_id: &str) -> Result<Vec<VolumeGroup>, MaasError> {
        let args = Params::new().id(system_id).build();
        self.cli.run_json(op::LIST_VOLUME_GROUPS, &args).await
    }

    async fn read_volume_group(&self, system_id: &str, volume_group_id: u64) -> Result<VolumeGroup, MaasError> {
        let args = Params::new().id(system_id).id(volume_group_id).build();
        self.cli.run_json(op::READ_VOLUME_GROUP, &args).await
    }

    async fn create_volume_group(&self, system_id: &str, name: &str, partition_ids: &[u64]) -> Result<VolumeGroup, MaasError> {
        let args = Params::new()
            .id(system_id)
            .kv("name", name)
            .repeated("partitions", partition_ids)
            .build();
        self.cli.run_json(op::CREATE_VOLUME_GROUP, &args).await
    }

    async fn delete_volume_group(&self, system_id: &str, volume_group_id: u64) -> Result<(), MaasError> {
        let args = Params::new().id(system_id).id(volume_group_id).build();
        self.cli.run_unit(op::DELETE_VOLUME_GROUP, &args).await
    }

    async fn create_logical_volume(&self, system_id: &str, volume_group_id: u64, name: &str, size: u64) -> Result<LogicalVolume, MaasError> {
        let args = Params::new()
            .id(system_id)
            .id(volume_group_id)
            .kv("name", name)
            .kv("size", size)
            .build();
        self.cli.run_json(op::CREATE_LOGICAL_VOLUME, &args).await
    }
}

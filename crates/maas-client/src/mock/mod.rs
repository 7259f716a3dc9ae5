//! Mock MaasClient for unit testing
//!
//! This module provides a mock implementation of MaasClientTrait that can be used
//! in unit tests without a MAAS region controller or the `maas` CLI.
//!
//! The mock is organized into domain-specific modules:
//! - `machines.rs` - Machine lifecycle (create, status, power, deploy)
//! - `storage.rs` - Block devices, partitions, volume groups, logical volumes
//!
//! Behaviour mirrors the parts of MAAS the provisioner relies on: missing
//! resources answer "not found", partitions used by a volume group cannot be
//! deleted, volume group names are unique, allocations must fit.

mod machines;
mod storage;

use crate::error::MaasError;
use crate::models::*;
use crate::maas_trait::MaasClientTrait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Size given to the boot disk of machines created through the mock (480 GiB)
pub const DEFAULT_BOOT_DISK_SIZE: u64 = 480 * 1024 * 1024 * 1024;

/// Failure injected for an operation
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Answer as MAAS does for a missing resource
    NotFound,
    /// Non-zero exit with the given stderr
    Command { exit_code: i32, stderr: String },
    /// Per-call timeout
    Timeout,
}

impl MockFailure {
    fn into_error(self, operation: &str) -> MaasError {
        match self {
            MockFailure::NotFound => MaasError::NotFound(format!("{}: Not Found", operation)),
            MockFailure::Command { exit_code, stderr } => MaasError::Command {
                operation: operation.to_string(),
                exit_code: Some(exit_code),
                stderr,
            },
            MockFailure::Timeout => MaasError::Timeout {
                operation: operation.to_string(),
                timeout_secs: 30,
            },
        }
    }
}

/// One recorded call against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: String,
    /// System id, or the hostname for `machines create`
    pub subject: String,
}

/// Per-machine state held by the mock
#[derive(Debug, Default)]
pub(crate) struct MockMachine {
    pub(crate) machine: Machine,
    /// Scripted statuses; each read consumes one, the last one sticks
    pub(crate) statuses: VecDeque<MachineStatus>,
    pub(crate) block_devices: BTreeMap<u64, BlockDevice>,
    pub(crate) volume_groups: BTreeMap<u64, VolumeGroup>,
    /// Partitions backing each volume group
    pub(crate) volume_group_partitions: BTreeMap<u64, Vec<u64>>,
    pub(crate) logical_volume_filesystems: BTreeMap<u64, Filesystem>,
    pub(crate) user_data: Option<String>,
    pub(crate) power_credentials: Option<PowerCredentials>,
}

/// Mock MaasClient for testing
///
/// This mock stores machines and their storage in memory and can be configured
/// to fail specific operations for testing different scenarios.
#[derive(Clone, Debug)]
pub struct MockMaasClient {
    pub(crate) profile: String,
    pub(crate) machines: Arc<Mutex<HashMap<String, MockMachine>>>,
    /// Status scripts applied to machines when they are created, by hostname
    pub(crate) status_scripts: Arc<Mutex<HashMap<String, Vec<MachineStatus>>>>,
    /// Injected failures keyed by operation and optional subject
    pub(crate) failures: Arc<Mutex<HashMap<(String, Option<String>), MockFailure>>>,
    pub(crate) calls: Arc<Mutex<Vec<MockCall>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl MockMaasClient {
    /// Create a new mock client
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            machines: Arc::new(Mutex::new(HashMap::new())),
            status_scripts: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a machine to the mock store (for test setup)
    pub fn add_machine(&self, machine: Machine) {
        let system_id = machine.system_id.clone();
        self.machines.lock().unwrap().insert(
            system_id,
            MockMachine {
                machine,
                ..Default::default()
            },
        );
    }

    /// Add a physical block device to a machine (for test setup)
    pub fn add_block_device(&self, system_id: &str, device: BlockDevice) {
        let mut machines = self.machines.lock().unwrap();
        let entry = machines.entry(system_id.to_string()).or_default();
        self.bump_next_id(device.id);
        for partition in &device.partitions {
            self.bump_next_id(partition.id);
        }
        entry.block_devices.insert(device.id, device);
    }

    /// Add a volume group backed by existing partitions (for test setup)
    pub fn add_volume_group(&self, system_id: &str, volume_group: VolumeGroup, partition_ids: Vec<u64>) {
        let mut machines = self.machines.lock().unwrap();
        let entry = machines.entry(system_id.to_string()).or_default();
        self.bump_next_id(volume_group.id);
        for lv in &volume_group.logical_volumes {
            self.bump_next_id(lv.id);
        }
        entry.volume_group_partitions.insert(volume_group.id, partition_ids);
        entry.volume_groups.insert(volume_group.id, volume_group);
    }

    /// Script the statuses a machine reports once it is created (for test setup)
    pub fn script_statuses(&self, hostname: &str, statuses: Vec<MachineStatus>) {
        self.status_scripts.lock().unwrap().insert(hostname.to_string(), statuses);
    }

    /// Script the statuses of an existing machine (for test setup)
    pub fn set_statuses(&self, system_id: &str, statuses: Vec<MachineStatus>) {
        if let Some(entry) = self.machines.lock().unwrap().get_mut(system_id) {
            entry.statuses = statuses.into();
        }
    }

    /// Make every call of `operation` fail
    pub fn fail_operation(&self, operation: &str, failure: MockFailure) {
        self.failures.lock().unwrap().insert((operation.to_string(), None), failure);
    }

    /// Make calls of `operation` against one subject (system id or hostname) fail
    pub fn fail_operation_for(&self, operation: &str, subject: &str, failure: MockFailure) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation.to_string(), Some(subject.to_string())), failure);
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Operations recorded against one subject, in order
    pub fn calls_for(&self, subject: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.subject == subject)
            .map(|c| c.operation.clone())
            .collect()
    }

    /// System id assigned to a hostname, if the machine exists
    pub fn system_id_of(&self, hostname: &str) -> Option<String> {
        self.machines
            .lock()
            .unwrap()
            .values()
            .find(|m| m.machine.hostname == hostname)
            .map(|m| m.machine.system_id.clone())
    }

    /// Snapshot of a machine
    pub fn machine(&self, system_id: &str) -> Option<Machine> {
        self.machines.lock().unwrap().get(system_id).map(|m| m.machine.clone())
    }

    /// Snapshot of a machine's physical block devices
    pub fn block_devices(&self, system_id: &str) -> Vec<BlockDevice> {
        self.machines
            .lock()
            .unwrap()
            .get(system_id)
            .map(|m| m.block_devices.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a machine's volume groups
    pub fn volume_groups(&self, system_id: &str) -> Vec<VolumeGroup> {
        self.machines
            .lock()
            .unwrap()
            .get(system_id)
            .map(|m| m.volume_groups.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Filesystem placed on a logical volume
    pub fn logical_volume_filesystem(&self, system_id: &str, logical_volume_id: u64) -> Option<Filesystem> {
        self.machines
            .lock()
            .unwrap()
            .get(system_id)
            .and_then(|m| m.logical_volume_filesystems.get(&logical_volume_id).cloned())
    }

    /// Base64 user data passed to the last deploy of a machine
    pub fn user_data(&self, system_id: &str) -> Option<String> {
        self.machines.lock().unwrap().get(system_id).and_then(|m| m.user_data.clone())
    }

    /// Power credentials pushed after deployment
    pub fn power_credentials(&self, system_id: &str) -> Option<PowerCredentials> {
        self.machines
            .lock()
            .unwrap()
            .get(system_id)
            .and_then(|m| m.power_credentials.clone())
    }

    /// Record a call and return the injected failure, if any
    pub(crate) fn record(&self, operation: &str, subject: &str) -> Result<(), MaasError> {
        self.calls.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            subject: subject.to_string(),
        });

        let failures = self.failures.lock().unwrap();
        let failure = failures
            .get(&(operation.to_string(), Some(subject.to_string())))
            .or_else(|| failures.get(&(operation.to_string(), None)))
            .cloned();
        match failure {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(()),
        }
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    /// Keep generated IDs clear of IDs seeded by tests
    fn bump_next_id(&self, seen: u64) {
        let mut id = self.next_id.lock().unwrap();
        if *id <= seen {
            *id = seen + 1;
        }
    }
}

pub(crate) fn machine_not_found(system_id: &str) -> MaasError {
    MaasError::NotFound(format!("Machine {} not found", system_id))
}

#[async_trait::async_trait]
impl MaasClientTrait for MockMaasClient {
    fn profile(&self) -> &str {
        &self.profile
    }

    // Machine lifecycle - delegated to machines module
    async fn create_machine(&self, request: &CreateMachineRequest) -> Result<Machine, MaasError> {
        machines::create_machine(self, request).await
    }

    async fn read_machine(&self, system_id: &str) -> Result<Machine, MaasError> {
        machines::read_machine(self, system_id).await
    }

    async fn update_power_credentials(&self, system_id: &str, credentials: &PowerCredentials) -> Result<(), MaasError> {
        machines::update_power_credentials(self, system_id, credentials).await
    }

    async fn deploy_machine(&self, system_id: &str, user_data: &str) -> Result<(), MaasError> {
        machines::deploy_machine(self, system_id, user_data).await
    }

    // Storage - delegated to storage module
    async fn list_block_devices(&self, system_id: &str) -> Result<Vec<BlockDevice>, MaasError> {
        storage::list_block_devices(self, system_id).await
    }

    async fn delete_block_device(&self, system_id: &str, device_id: u64) -> Result<(), MaasError> {
        storage::delete_block_device(self, system_id, device_id).await
    }

    async fn format_block_device(&self, system_id: &str, device_id: u64, fstype: &str) -> Result<(), MaasError> {
        storage::format_block_device(self, system_id, device_id, fstype).await
    }

    async fn mount_block_device(&self, system_id: &str, device_id: u64, mount_point: &str) -> Result<(), MaasError> {
        storage::mount_block_device(self, system_id, device_id, mount_point).await
    }

    async fn list_partitions(&self, system_id: &str, device_id: u64) -> Result<Vec<Partition>, MaasError> {
        storage::list_partitions(self, system_id, device_id).await
    }

    async fn create_partition(&self, system_id: &str, device_id: u64, size: Option<u64>, bootable: Option<bool>) -> Result<Partition, MaasError> {
        storage::create_partition(self, system_id, device_id, size, bootable).await
    }

    async fn delete_partition(&self, system_id: &str, device_id: u64, partition_id: u64) -> Result<(), MaasError> {
        storage::delete_partition(self, system_id, device_id, partition_id).await
    }

    async fn format_partition(&self, system_id: &str, device_id: u64, partition_id: u64, fstype: &str) -> Result<(), MaasError> {
        storage::format_partition(self, system_id, device_id, partition_id, fstype).await
    }

    async fn mount_partition(&self, system_id: &str, device_id: u64, partition_id: u64, mount_point: &str) -> Result<(), MaasError> {
        storage::mount_partition(self, system_id, device_id, partition_id, mount_point).await
    }

    async fn list_volume_groups(&self, system_id: &str) -> Result<Vec<VolumeGroup>, MaasError> {
        storage::list_volume_groups(self, system_id).await
    }

    async fn read_volume_group(&self, system_id: &str, volume_group_id: u64) -> Result<VolumeGroup, MaasError> {
        storage::read_volume_group(self, system_id, volume_group_id).await
    }

    async fn create_volume_group(&self, system_id: &str, name: &str, partition_ids: &[u64]) -> Result<VolumeGroup, MaasError> {
        storage::create_volume_group(self, system_id, name, partition_ids).await
    }

    async fn delete_volume_group(&self, system_id: &str, volume_group_id: u64) -> Result<(), MaasError> {
        storage::delete_volume_group(self, system_id, volume_group_id).await
    }

    async fn create_logical_volume(&self, system_id: &str, volume_group_id: u64, name: &str, size: u64) -> Result<LogicalVolume, MaasError> {
        storage::create_logical_volume(self, system_id, volume_group_id, name, size).await
    }
}

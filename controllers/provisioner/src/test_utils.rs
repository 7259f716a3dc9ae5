//! Test utilities for unit testing the pipeline and storage engine
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::connectivity::ReachabilityProbe;
#[cfg(test)]
use crate::pipeline::{PipelineOptions, PipelineTimings};
#[cfg(test)]
use crate::poller::WaitPolicy;
#[cfg(test)]
use inventory::{Batch, BatchRow, DeploymentStatus, NodeDescriptor, PowerSettings};
#[cfg(test)]
use maas_client::{BlockDevice, BlockDeviceRef, Machine, MachineStatus, MockMaasClient, Partition, VolumeGroup, LogicalVolume};
#[cfg(test)]
use std::path::Path;
#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Helper to create a test node descriptor
#[cfg(test)]
pub fn node(hostname: &str) -> NodeDescriptor {
    node_with_ip(hostname, "10.0.0.1")
}

#[cfg(test)]
pub fn node_with_ip(hostname: &str, ip: &str) -> NodeDescriptor {
    NodeDescriptor {
        hostname: hostname.to_string(),
        architecture: "amd64/generic".to_string(),
        mac_addresses: vec!["52:54:00:12:34:56".to_string()],
        power_type: "ipmi".to_string(),
        power: PowerSettings {
            user: "admin".to_string(),
            pass: "secret".to_string(),
            driver: "LAN_2_0".to_string(),
            address: "10.10.0.1".to_string(),
            extras: [("cipher_suite_id".to_string(), "3".to_string())].into_iter().collect(),
        },
        ip: ip.to_string(),
        ..Default::default()
    }
}

/// Helper to create a batch whose rows already carry a status
#[cfg(test)]
pub fn batch_with_statuses(rows: &[(&str, &str, Option<DeploymentStatus>)]) -> Batch {
    Batch {
        headers: vec!["hostname".to_string(), "ip".to_string()],
        rows: rows
            .iter()
            .map(|(hostname, ip, status)| BatchRow {
                values: vec![hostname.to_string(), ip.to_string()],
                node: node_with_ip(hostname, ip),
                status: *status,
            })
            .collect(),
    }
}

/// Stage timings short enough for paused-clock tests
#[cfg(test)]
pub fn fast_timings() -> PipelineTimings {
    PipelineTimings {
        ready: WaitPolicy::from_secs(10, 1),
        deployed: WaitPolicy::from_secs(20, 2),
        connectivity: WaitPolicy::from_secs(30, 5),
    }
}

/// Pipeline options writing artifacts under `dir`, using `template` for every node
#[cfg(test)]
pub fn pipeline_options(dir: &Path, template: &Path) -> PipelineOptions {
    PipelineOptions {
        cloud_init_template: Some(template.to_path_buf()),
        artifact_dir: dir.join("maas-cloud-init"),
        preserve_artifacts: false,
        storage_layout: None,
        timings: fast_timings(),
    }
}

/// Write a minimal cloud-init template into `dir`
#[cfg(test)]
pub fn write_cloud_init_template(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("cloud-init.yaml");
    std::fs::write(&path, "#cloud-config\nwrite_files:\n  - content: ${ip} ${storage_ip}\n").unwrap();
    path
}

/// Helper to add a machine with one boot disk to the mock
#[cfg(test)]
pub fn machine_with_disk(client: &MockMaasClient, system_id: &str, hostname: &str, disk_size: u64) -> u64 {
    let disk_id = 1;
    client.add_machine(Machine {
        system_id: system_id.to_string(),
        hostname: hostname.to_string(),
        status_name: MachineStatus::Deployed,
        boot_disk: Some(BlockDeviceRef {
            id: disk_id,
            name: "sda".to_string(),
        }),
    });
    client.add_block_device(
        system_id,
        BlockDevice {
            id: disk_id,
            name: "sda".to_string(),
            size: disk_size,
            device_type: "physical".to_string(),
            partitions: vec![],
            filesystem: None,
        },
    );
    disk_id
}

/// Seed a previous layout: two partitions on the boot disk, a second disk
/// with one partition, and a volume group with two logical volumes
#[cfg(test)]
pub fn seed_existing_layout(client: &MockMaasClient, system_id: &str, boot_disk_size: u64) {
    client.add_block_device(
        system_id,
        BlockDevice {
            id: 1,
            name: "sda".to_string(),
            size: boot_disk_size,
            device_type: "physical".to_string(),
            partitions: vec![
                Partition { id: 10, size: GIB, bootable: true, filesystem: None },
                Partition { id: 11, size: 50 * GIB, bootable: false, filesystem: None },
            ],
            filesystem: None,
        },
    );
    client.add_block_device(
        system_id,
        BlockDevice {
            id: 2,
            name: "sdb".to_string(),
            size: 100 * GIB,
            device_type: "physical".to_string(),
            partitions: vec![Partition { id: 20, size: 100 * GIB, bootable: false, filesystem: None }],
            filesystem: None,
        },
    );
    client.add_volume_group(
        system_id,
        VolumeGroup {
            id: 30,
            name: "old_vg".to_string(),
            size: 50 * GIB,
            logical_volumes: vec![
                LogicalVolume { id: 31, name: "old_vg-data".to_string(), size: 40 * GIB },
                LogicalVolume { id: 32, name: "old_vg-logs".to_string(), size: 10 * GIB },
            ],
        },
        vec![11],
    );
}

/// Reachability probe answering from a script
#[cfg(test)]
#[derive(Debug)]
pub struct ScriptedProbe {
    /// Attempt number (1-based) that first succeeds
    succeed_on: Option<usize>,
    targets: Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedProbe {
    pub fn succeed_on(attempt: usize) -> Self {
        Self {
            succeed_on: Some(attempt),
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn always() -> Self {
        Self::succeed_on(1)
    }

    pub fn never() -> Self {
        Self {
            succeed_on: None,
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.targets.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, ip: &str) -> usize {
        self.targets.lock().unwrap().iter().filter(|t| *t == ip).count()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, ip: &str) -> bool {
        let mut targets = self.targets.lock().unwrap();
        targets.push(ip.to_string());
        let attempt = targets.iter().filter(|t| *t == ip).count();
        self.succeed_on.is_some_and(|n| attempt >= n)
    }
}

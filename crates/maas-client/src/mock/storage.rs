//! Storage operations for MockMaasClient
//!
//! Handles block devices, partitions, volume groups and logical volumes.

use super::{machine_not_found, MockMachine, MockMaasClient};
use crate::common::op;
use crate::error::MaasError;
use crate::models::*;

fn command_error(operation: &str, stderr: impl Into<String>) -> MaasError {
    MaasError::Command {
        operation: operation.to_string(),
        exit_code: Some(2),
        stderr: stderr.into(),
    }
}

fn not_found(what: &str, id: u64) -> MaasError {
    MaasError::NotFound(format!("No {} matches the given query ({})", what, id))
}

/// Run `f` against one machine's state
fn with_machine<T>(
    client: &MockMaasClient,
    system_id: &str,
    f: impl FnOnce(&mut MockMachine) -> Result<T, MaasError>,
) -> Result<T, MaasError> {
    let mut machines = client.machines.lock().unwrap();
    let entry = machines.get_mut(system_id).ok_or_else(|| machine_not_found(system_id))?;
    f(entry)
}

fn used_by_volume_group(entry: &MockMachine, partition_id: u64) -> bool {
    entry
        .volume_group_partitions
        .values()
        .any(|ids| ids.contains(&partition_id))
}

pub async fn list_block_devices(client: &MockMaasClient, system_id: &str) -> Result<Vec<BlockDevice>, MaasError> {
    client.record(op::LIST_BLOCK_DEVICES, system_id)?;
    with_machine(client, system_id, |entry| Ok(entry.block_devices.values().cloned().collect()))
}

pub async fn delete_block_device(client: &MockMaasClient, system_id: &str, device_id: u64) -> Result<(), MaasError> {
    client.record(op::DELETE_BLOCK_DEVICE, system_id)?;
    with_machine(client, system_id, |entry| {
        // Logical volumes are addressed as block devices
        for volume_group in entry.volume_groups.values_mut() {
            if let Some(pos) = volume_group.logical_volumes.iter().position(|lv| lv.id == device_id) {
                volume_group.logical_volumes.remove(pos);
                entry.logical_volume_filesystems.remove(&device_id);
                return Ok(());
            }
        }
        entry
            .block_devices
            .remove(&device_id)
            .map(|_| ())
            .ok_or_else(|| not_found("BlockDevice", device_id))
    })
}

pub async fn format_block_device(client: &MockMaasClient, system_id: &str, device_id: u64, fstype: &str) -> Result<(), MaasError> {
    client.record(op::FORMAT_BLOCK_DEVICE, system_id)?;
    with_machine(client, system_id, |entry| {
        let filesystem = Filesystem {
            fstype: fstype.to_string(),
            mount_point: None,
        };
        let is_logical_volume = entry
            .volume_groups
            .values()
            .any(|vg| vg.logical_volumes.iter().any(|lv| lv.id == device_id));
        if is_logical_volume {
            entry.logical_volume_filesystems.insert(device_id, filesystem);
            return Ok(());
        }
        let device = entry
            .block_devices
            .get_mut(&device_id)
            .ok_or_else(|| not_found("BlockDevice", device_id))?;
        device.filesystem = Some(filesystem);
        Ok(())
    })
}

pub async fn mount_block_device(client: &MockMaasClient, system_id: &str, device_id: u64, mount_point: &str) -> Result<(), MaasError> {
    client.record(op::MOUNT_BLOCK_DEVICE, system_id)?;
    with_machine(client, system_id, |entry| {
        let filesystem = match entry.logical_volume_filesystems.get_mut(&device_id) {
            Some(filesystem) => Some(filesystem),
            None => entry
                .block_devices
                .get_mut(&device_id)
                .map(|device| device.filesystem.as_mut())
                .ok_or_else(|| not_found("BlockDevice", device_id))?,
        };
        let filesystem = filesystem.ok_or_else(|| {
            command_error(op::MOUNT_BLOCK_DEVICE, "Cannot mount an unformatted block device.")
        })?;
        filesystem.mount_point = Some(mount_point.to_string());
        Ok(())
    })
}

pub async fn list_partitions(client: &MockMaasClient, system_id: &str, device_id: u64) -> Result<Vec<Partition>, MaasError> {
    client.record(op::LIST_PARTITIONS, system_id)?;
    with_machine(client, system_id, |entry| {
        entry
            .block_devices
            .get(&device_id)
            .map(|device| device.partitions.clone())
            .ok_or_else(|| not_found("BlockDevice", device_id))
    })
}

pub async fn create_partition(
    client: &MockMaasClient,
    system_id: &str,
    device_id: u64,
    size: Option<u64>,
    bootable: Option<bool>,
) -> Result<Partition, MaasError> {
    client.record(op::CREATE_PARTITION, system_id)?;
    let id = client.next_id();
    with_machine(client, system_id, |entry| {
        let device = entry
            .block_devices
            .get_mut(&device_id)
            .ok_or_else(|| not_found("BlockDevice", device_id))?;
        let used: u64 = device.partitions.iter().map(|p| p.size).sum();
        let free = device.size.saturating_sub(used);
        let size = size.unwrap_or(free);
        if size == 0 || size > free {
            return Err(command_error(
                op::CREATE_PARTITION,
                format!("{{\"size\": [\"Requested {} bytes but only {} bytes available.\"]}}", size, free),
            ));
        }
        let partition = Partition {
            id,
            size,
            bootable: bootable.unwrap_or(false),
            filesystem: None,
        };
        device.partitions.push(partition.clone());
        Ok(partition)
    })
}

pub async fn delete_partition(client: &MockMaasClient, system_id: &str, device_id: u64, partition_id: u64) -> Result<(), MaasError> {
    client.record(op::DELETE_PARTITION, system_id)?;
    with_machine(client, system_id, |entry| {
        if used_by_volume_group(entry, partition_id) {
            return Err(command_error(
                op::DELETE_PARTITION,
                "Cannot delete partition because it is part of a volume group.",
            ));
        }
        let device = entry
            .block_devices
            .get_mut(&device_id)
            .ok_or_else(|| not_found("BlockDevice", device_id))?;
        let pos = device
            .partitions
            .iter()
            .position(|p| p.id == partition_id)
            .ok_or_else(|| not_found("Partition", partition_id))?;
        device.partitions.remove(pos);
        Ok(())
    })
}

fn find_partition(entry: &mut MockMachine, device_id: u64, partition_id: u64) -> Result<&mut Partition, MaasError> {
    entry
        .block_devices
        .get_mut(&device_id)
        .ok_or_else(|| not_found("BlockDevice", device_id))?
        .partitions
        .iter_mut()
        .find(|p| p.id == partition_id)
        .ok_or_else(|| not_found("Partition", partition_id))
}

pub async fn format_partition(
    client: &MockMaasClient,
    system_id: &str,
    device_id: u64,
    partition_id: u64,
    fstype: &str,
) -> Result<(), MaasError> {
    client.record(op::FORMAT_PARTITION, system_id)?;
    with_machine(client, system_id, |entry| {
        if used_by_volume_group(entry, partition_id) {
            return Err(command_error(
                op::FORMAT_PARTITION,
                "Cannot format partition because it is part of a volume group.",
            ));
        }
        let partition = find_partition(entry, device_id, partition_id)?;
        partition.filesystem = Some(Filesystem {
            fstype: fstype.to_string(),
            mount_point: None,
        });
        Ok(())
    })
}

pub async fn mount_partition(
    client: &MockMaasClient,
    system_id: &str,
    device_id: u64,
    partition_id: u64,
    mount_point: &str,
) -> Result<(), MaasError> {
    client.record(op::MOUNT_PARTITION, system_id)?;
    with_machine(client, system_id, |entry| {
        let partition = find_partition(entry, device_id, partition_id)?;
        let filesystem = partition.filesystem.as_mut().ok_or_else(|| {
            command_error(op::MOUNT_PARTITION, "Cannot mount an unformatted partition.")
        })?;
        filesystem.mount_point = Some(mount_point.to_string());
        Ok(())
    })
}

pub async fn list_volume_groups(client: &MockMaasClient, system_id: &str) -> Result<Vec<VolumeGroup>, MaasError> {
    client.record(op::LIST_VOLUME_GROUPS, system_id)?;
    with_machine(client, system_id, |entry| Ok(entry.volume_groups.values().cloned().collect()))
}

pub async fn read_volume_group(client: &MockMaasClient, system_id: &str, volume_group_id: u64) -> Result<VolumeGroup, MaasError> {
    client.record(op::READ_VOLUME_GROUP, system_id)?;
    with_machine(client, system_id, |entry| {
        entry
            .volume_groups
            .get(&volume_group_id)
            .cloned()
            .ok_or_else(|| not_found("VolumeGroup", volume_group_id))
    })
}

pub async fn create_volume_group(
    client: &MockMaasClient,
    system_id: &str,
    name: &str,
    partition_ids: &[u64],
) -> Result<VolumeGroup, MaasError> {
    client.record(op::CREATE_VOLUME_GROUP, system_id)?;
    let id = client.next_id();
    with_machine(client, system_id, |entry| {
        if entry.volume_groups.values().any(|vg| vg.name == name) {
            return Err(command_error(
                op::CREATE_VOLUME_GROUP,
                format!("{{\"name\": [\"Volume group with this name '{}' already exists.\"]}}", name),
            ));
        }
        let mut size = 0;
        for partition_id in partition_ids {
            if used_by_volume_group(entry, *partition_id) {
                return Err(command_error(
                    op::CREATE_VOLUME_GROUP,
                    format!("Partition {} is already part of a volume group.", partition_id),
                ));
            }
            let partition = entry
                .block_devices
                .values()
                .flat_map(|d| d.partitions.iter())
                .find(|p| p.id == *partition_id)
                .ok_or_else(|| {
                    command_error(
                        op::CREATE_VOLUME_GROUP,
                        format!("{{\"partitions\": [\"{} is not a valid partition id.\"]}}", partition_id),
                    )
                })?;
            size += partition.size;
        }
        let volume_group = VolumeGroup {
            id,
            name: name.to_string(),
            size,
            logical_volumes: Vec::new(),
        };
        entry.volume_group_partitions.insert(id, partition_ids.to_vec());
        entry.volume_groups.insert(id, volume_group.clone());
        Ok(volume_group)
    })
}

pub async fn delete_volume_group(client: &MockMaasClient, system_id: &str, volume_group_id: u64) -> Result<(), MaasError> {
    client.record(op::DELETE_VOLUME_GROUP, system_id)?;
    with_machine(client, system_id, |entry| {
        let volume_group = entry
            .volume_groups
            .remove(&volume_group_id)
            .ok_or_else(|| not_found("VolumeGroup", volume_group_id))?;
        for lv in &volume_group.logical_volumes {
            entry.logical_volume_filesystems.remove(&lv.id);
        }
        entry.volume_group_partitions.remove(&volume_group_id);
        Ok(())
    })
}

pub async fn create_logical_volume(
    client: &MockMaasClient,
    system_id: &str,
    volume_group_id: u64,
    name: &str,
    size: u64,
) -> Result<LogicalVolume, MaasError> {
    client.record(op::CREATE_LOGICAL_VOLUME, system_id)?;
    let id = client.next_id();
    with_machine(client, system_id, |entry| {
        let volume_group = entry
            .volume_groups
            .get_mut(&volume_group_id)
            .ok_or_else(|| not_found("VolumeGroup", volume_group_id))?;
        let used: u64 = volume_group.logical_volumes.iter().map(|lv| lv.size).sum();
        let free = volume_group.size.saturating_sub(used);
        if size > free {
            return Err(command_error(
                op::CREATE_LOGICAL_VOLUME,
                format!("{{\"size\": [\"Requested {} bytes but only {} bytes available.\"]}}", size, free),
            ));
        }
        let logical_volume = LogicalVolume {
            id,
            name: format!("{}-{}", volume_group.name, name),
            size,
        };
        volume_group.logical_volumes.push(logical_volume.clone());
        Ok(logical_volume)
    })
}

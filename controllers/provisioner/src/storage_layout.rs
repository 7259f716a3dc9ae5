//! Boot disk layout reconstruction
//!
//! Tears down every volume group and partition MAAS reports for a machine,
//! then rebuilds the layout described by a `LayoutTemplate`:
//!
//! 1. EFI partition (bootable) and `/boot` partition on the boot disk
//! 2. a data partition sized to the sum of the template's volumes
//! 3. one volume group on the data partition, one logical volume per template entry
//! 4. fat32 `/boot/efi`, ext4 `/boot`, and each logical volume formatted and mounted
//!    (swap volumes are formatted but not mounted)
//!
//! Reads and deletes treat "not found" as empty. Errors never leave
//! `configure_node`; they are logged to the node's storage log.

use crate::error::ProvisionError;
use crate::logging::StorageLog;
use inventory::LayoutTemplate;
use maas_client::{MaasClientTrait, NotFoundExt, Partition, VolumeGroup};

pub const EFI_FSTYPE: &str = "fat32";
pub const EFI_MOUNT_POINT: &str = "/boot/efi";
pub const BOOT_FSTYPE: &str = "ext4";
pub const BOOT_MOUNT_POINT: &str = "/boot";
pub const SWAP_FSTYPE: &str = "swap";

/// What a layout run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutOutcome {
    /// MAAS reported no boot disk; nothing was changed
    NoBootDisk,
    Applied {
        volume_group_id: u64,
        logical_volumes: usize,
    },
}

/// Zero means "no size constraint": let MAAS use the remaining space
fn size_arg(bytes: u64) -> Option<u64> {
    (bytes > 0).then_some(bytes)
}

/// Rebuild the layout of one machine and log the result. Never fails.
pub async fn configure_node(
    client: &dyn MaasClientTrait,
    system_id: &str,
    template: &LayoutTemplate,
    log: &StorageLog,
) -> Option<LayoutOutcome> {
    log.info("Starting MAAS storage configuration");
    let result = apply_layout(client, system_id, template, log).await;
    let outcome = match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            log.error(format!("Configuration failed - {}", e));
            None
        }
    };
    log.info("MAAS storage configuration completed");
    outcome
}

/// Tear down and rebuild the storage layout of `system_id`
pub async fn apply_layout(
    client: &dyn MaasClientTrait,
    system_id: &str,
    template: &LayoutTemplate,
    log: &StorageLog,
) -> Result<LayoutOutcome, ProvisionError> {
    log.info("Starting storage configuration");

    let efi_bytes = template.boot_efi_bytes().map_err(ProvisionError::from_inventory)?;
    let boot_bytes = template.boot_bytes().map_err(ProvisionError::from_inventory)?;
    let data_bytes = template.data_partition_bytes().map_err(ProvisionError::from_inventory)?;

    let machine = client.read_machine(system_id).await?;
    let Some(boot_disk) = machine.boot_disk.map(|disk| disk.id) else {
        log.warn("No boot disk found");
        return Ok(LayoutOutcome::NoBootDisk);
    };

    teardown(client, system_id, log).await?;

    log.info(format!("Creating new partitions on boot disk {}", boot_disk));
    let efi = client
        .create_partition(system_id, boot_disk, size_arg(efi_bytes), Some(true))
        .await?;
    log.info(format!("Created /boot/efi partition (ID: {})", efi.id));
    let boot = client
        .create_partition(system_id, boot_disk, size_arg(boot_bytes), Some(false))
        .await?;
    log.info(format!("Created /boot partition (ID: {})", boot.id));

    let data = client
        .create_partition(system_id, boot_disk, size_arg(data_bytes), None)
        .await?;
    log.info(format!("Created data partition (ID: {}, {} bytes)", data.id, data.size));

    log.info(format!("Creating volume group {}", template.vg_group));
    let volume_group = client
        .create_volume_group(system_id, &template.vg_group, &[data.id])
        .await?;

    log.info(format!("Loaded {} LV configs from template", template.volumes.len()));
    for volume in &template.volumes {
        let bytes = volume.size_bytes().map_err(ProvisionError::from_inventory)?;
        log.info(format!("Creating LV '{}' with size {}", volume.name, volume.size));
        client
            .create_logical_volume(system_id, volume_group.id, &volume.name, bytes)
            .await?;
    }

    log.info("Formatting and mounting LVs");
    let logical_volumes = format_and_mount(client, system_id, boot_disk, &efi, &boot, &volume_group, template, log).await?;

    log.info("Storage configuration complete");
    Ok(LayoutOutcome::Applied {
        volume_group_id: volume_group.id,
        logical_volumes,
    })
}

/// Delete every logical volume, volume group and partition on the machine
async fn teardown(client: &dyn MaasClientTrait, system_id: &str, log: &StorageLog) -> Result<(), ProvisionError> {
    log.info("Cleaning existing volume groups");
    for listed in client.list_volume_groups(system_id).await.or_empty()? {
        let current = client.read_volume_group(system_id, listed.id).await.or_empty()?;
        for lv in &current.logical_volumes {
            client.delete_block_device(system_id, lv.id).await.or_empty()?;
        }
        client.delete_volume_group(system_id, listed.id).await.or_empty()?;
    }

    log.info("Cleaning partitions on all devices");
    for device in client.list_block_devices(system_id).await.or_empty()? {
        for partition in client.list_partitions(system_id, device.id).await.or_empty()? {
            client
                .delete_partition(system_id, device.id, partition.id)
                .await
                .or_empty()?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments, reason = "each argument is a distinct piece of the layout being realized")]
async fn format_and_mount(
    client: &dyn MaasClientTrait,
    system_id: &str,
    boot_disk: u64,
    efi: &Partition,
    boot: &Partition,
    volume_group: &VolumeGroup,
    template: &LayoutTemplate,
    log: &StorageLog,
) -> Result<usize, ProvisionError> {
    log.info("Formatting boot partitions");
    client.format_partition(system_id, boot_disk, efi.id, EFI_FSTYPE).await?;
    client.format_partition(system_id, boot_disk, boot.id, BOOT_FSTYPE).await?;

    log.info("Mounting boot partitions");
    client.mount_partition(system_id, boot_disk, efi.id, EFI_MOUNT_POINT).await?;
    client.mount_partition(system_id, boot_disk, boot.id, BOOT_MOUNT_POINT).await?;

    let realized = client.read_volume_group(system_id, volume_group.id).await.or_empty()?;
    for lv in &realized.logical_volumes {
        let base_name = template.base_volume_name(&lv.name);
        if inventory::is_swap_name(base_name) {
            log.info(format!("Formatting LV '{}' as swap", base_name));
            client.format_block_device(system_id, lv.id, SWAP_FSTYPE).await?;
            continue;
        }

        let spec = template.volume_for(&lv.name);
        let fs_type = spec.map(|s| s.fs_type()).unwrap_or(BOOT_FSTYPE);
        log.info(format!("Formatting LV '{}' as {}", base_name, fs_type));
        client.format_block_device(system_id, lv.id, fs_type).await?;

        match spec.and_then(|s| s.mount_point.as_deref()).filter(|m| !m.is_empty()) {
            Some(mount_point) => {
                log.info(format!("Mounting LV '{}' at '{}'", base_name, mount_point));
                client.mount_block_device(system_id, lv.id, mount_point).await?;
            }
            None => log.warn(format!("LV '{}' has no mount point, leaving it unmounted", base_name)),
        }
    }

    log.info("Formatting and mounting completed successfully");
    Ok(realized.logical_volumes.len())
}

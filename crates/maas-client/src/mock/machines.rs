//! Machine lifecycle operations for MockMaasClient

use super::{machine_not_found, MockMachine, MockMaasClient, DEFAULT_BOOT_DISK_SIZE};
use crate::common::op;
use crate::error::MaasError;
use crate::models::*;
use std::collections::VecDeque;

pub async fn create_machine(client: &MockMaasClient, request: &CreateMachineRequest) -> Result<Machine, MaasError> {
    client.record(op::CREATE_MACHINE, &request.hostname)?;

    let mut machines = client.machines.lock().unwrap();
    if machines.values().any(|m| m.machine.hostname == request.hostname) {
        return Err(MaasError::Command {
            operation: op::CREATE_MACHINE.to_string(),
            exit_code: Some(2),
            stderr: format!("{{\"hostname\": [\"Node with hostname \\\"{}\\\" already exists.\"]}}", request.hostname),
        });
    }

    let statuses: VecDeque<MachineStatus> = client
        .status_scripts
        .lock()
        .unwrap()
        .get(&request.hostname)
        .cloned()
        .unwrap_or_default()
        .into();

    let system_id = format!("sys{:04}", client.next_id());
    let disk_id = client.next_id();
    let boot_disk = BlockDevice {
        id: disk_id,
        name: "sda".to_string(),
        size: DEFAULT_BOOT_DISK_SIZE,
        device_type: "physical".to_string(),
        partitions: Vec::new(),
        filesystem: None,
    };

    let machine = Machine {
        system_id: system_id.clone(),
        hostname: request.hostname.clone(),
        // Unscripted machines commission instantly
        status_name: statuses.front().copied().unwrap_or(MachineStatus::Ready),
        boot_disk: Some(BlockDeviceRef {
            id: disk_id,
            name: boot_disk.name.clone(),
        }),
    };

    let mut entry = MockMachine {
        machine: machine.clone(),
        statuses,
        ..Default::default()
    };
    entry.block_devices.insert(disk_id, boot_disk);
    machines.insert(system_id, entry);

    Ok(machine)
}

pub async fn read_machine(client: &MockMaasClient, system_id: &str) -> Result<Machine, MaasError> {
    client.record(op::READ_MACHINE, system_id)?;

    let mut machines = client.machines.lock().unwrap();
    let entry = machines.get_mut(system_id).ok_or_else(|| machine_not_found(system_id))?;

    let scripted = if entry.statuses.len() > 1 {
        entry.statuses.pop_front()
    } else {
        entry.statuses.front().copied()
    };
    if let Some(status) = scripted {
        entry.machine.status_name = status;
    }
    Ok(entry.machine.clone())
}

pub async fn update_power_credentials(
    client: &MockMaasClient,
    system_id: &str,
    credentials: &PowerCredentials,
) -> Result<(), MaasError> {
    client.record(op::UPDATE_MACHINE, system_id)?;

    let mut machines = client.machines.lock().unwrap();
    let entry = machines.get_mut(system_id).ok_or_else(|| machine_not_found(system_id))?;
    entry.power_credentials = Some(credentials.clone());
    Ok(())
}

pub async fn deploy_machine(client: &MockMaasClient, system_id: &str, user_data: &str) -> Result<(), MaasError> {
    client.record(op::DEPLOY_MACHINE, system_id)?;

    let mut machines = client.machines.lock().unwrap();
    let entry = machines.get_mut(system_id).ok_or_else(|| machine_not_found(system_id))?;
    if entry.machine.status_name != MachineStatus::Ready {
        return Err(MaasError::Command {
            operation: op::DEPLOY_MACHINE.to_string(),
            exit_code: Some(2),
            stderr: format!(
                "Machine cannot be deployed in its current state '{}'.",
                entry.machine.status_name
            ),
        });
    }
    entry.user_data = Some(user_data.to_string());
    if entry.statuses.is_empty() {
        entry.machine.status_name = MachineStatus::Deployed;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maas_trait::MaasClientTrait;
    use crate::mock::MockFailure;

    fn request(hostname: &str) -> CreateMachineRequest {
        CreateMachineRequest {
            hostname: hostname.to_string(),
            architecture: "amd64/generic".to_string(),
            mac_addresses: vec!["52:54:00:00:00:01".to_string()],
            power_type: "ipmi".to_string(),
            power_parameters: PowerParameters::default(),
        }
    }

    #[tokio::test]
    async fn test_unscripted_machine_is_ready_then_deployed() {
        let client = MockMaasClient::new("admin");
        let machine = client.create_machine(&request("node-1")).await.unwrap();
        assert_eq!(client.read_status(&machine.system_id).await.unwrap(), MachineStatus::Ready);

        client.deploy_machine(&machine.system_id, "I2Nsb3VkLWNvbmZpZw==").await.unwrap();
        assert_eq!(client.read_status(&machine.system_id).await.unwrap(), MachineStatus::Deployed);
        assert_eq!(client.user_data(&machine.system_id).as_deref(), Some("I2Nsb3VkLWNvbmZpZw=="));
    }

    #[tokio::test]
    async fn test_scripted_statuses_advance_and_stick() {
        let client = MockMaasClient::new("admin");
        client.script_statuses(
            "node-1",
            vec![MachineStatus::Commissioning, MachineStatus::Ready],
        );
        let machine = client.create_machine(&request("node-1")).await.unwrap();
        assert_eq!(machine.status_name, MachineStatus::Commissioning);
        assert_eq!(client.read_status(&machine.system_id).await.unwrap(), MachineStatus::Commissioning);
        assert_eq!(client.read_status(&machine.system_id).await.unwrap(), MachineStatus::Ready);
        assert_eq!(client.read_status(&machine.system_id).await.unwrap(), MachineStatus::Ready);
    }

    #[tokio::test]
    async fn test_duplicate_hostname_rejected() {
        let client = MockMaasClient::new("admin");
        client.create_machine(&request("node-1")).await.unwrap();
        assert!(client.create_machine(&request("node-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_create_failure_is_per_hostname() {
        let client = MockMaasClient::new("admin");
        client.fail_operation_for(
            op::CREATE_MACHINE,
            "node-b",
            MockFailure::Command {
                exit_code: 2,
                stderr: "Invalid power parameters".to_string(),
            },
        );
        assert!(client.create_machine(&request("node-a")).await.is_ok());
        assert!(client.create_machine(&request("node-b")).await.is_err());
        assert_eq!(client.calls_for("node-b"), vec![op::CREATE_MACHINE.to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing_machine_is_not_found() {
        let client = MockMaasClient::new("admin");
        let err = client.read_machine("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}

//! Unit tests for the provisioning pipeline

#[cfg(test)]
mod tests {
    use crate::pipeline::{BatchReport, ProvisioningPipeline, StorageLayoutOptions};
    use crate::state::{NodeLifecycle, NodeRuntimeState};
    use crate::test_utils::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use inventory::DeploymentStatus;
    use maas_client::{op, MachineStatus, MockFailure, MockMaasClient};
    use std::sync::Arc;

    fn command_failure(stderr: &str) -> MockFailure {
        MockFailure::Command {
            exit_code: 2,
            stderr: stderr.to_string(),
        }
    }

    fn assert_monotonic(state: &NodeRuntimeState) {
        for pair in state.history.windows(2) {
            assert!(
                pair[0].can_advance_to(&pair[1]),
                "{}: {} -> {}",
                state.hostname,
                pair[0],
                pair[1]
            );
        }
        let terminal = state.history.iter().filter(|s| s.is_terminal()).count();
        assert_eq!(terminal, 1, "{}: {:?}", state.hostname, state.history);
        assert!(state.deployment_status.is_some(), "{} has no status", state.hostname);
        if state.deployment_status.is_some_and(|s| s.is_deployed()) {
            assert!(state.visited(&NodeLifecycle::Ready), "{} deployed without Ready", state.hostname);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_node_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());

        let client = MockMaasClient::new("admin");
        client.script_statuses(
            "node-a",
            vec![
                MachineStatus::Commissioning,
                MachineStatus::Ready,
                MachineStatus::Deploying,
                MachineStatus::Deployed,
            ],
        );
        client.fail_operation_for(op::CREATE_MACHINE, "node-b", command_failure("Invalid power parameters"));
        let probe = Arc::new(ScriptedProbe::succeed_on(2));

        let pipeline = ProvisioningPipeline::new(
            Arc::new(client.clone()),
            probe.clone(),
            2,
            pipeline_options(dir.path(), &template),
        );
        let states = pipeline
            .run(vec![node_with_ip("node-a", "10.0.0.11"), node_with_ip("node-b", "10.0.0.12")])
            .await;

        let (a, b) = (&states[0], &states[1]);
        assert_eq!(a.deployment_status, Some(DeploymentStatus::Deployed));
        assert_eq!(a.lifecycle, NodeLifecycle::Reachable);
        assert_eq!(probe.attempts_for("10.0.0.11"), 2);

        assert_eq!(
            b.deployment_status.map(|s| s.to_string()).as_deref(),
            Some("System ID Missing Machine Was Not Created")
        );
        assert_eq!(client.calls_for("node-b"), vec![op::CREATE_MACHINE.to_string()]);
        assert_eq!(client.system_id_of("node-b"), None);
        assert_eq!(probe.attempts_for("10.0.0.12"), 0);

        // Deployed with the rendered document, credentials pushed, artifact cleaned up
        let system_id = a.system_id.clone().unwrap();
        let expected = "#cloud-config\nwrite_files:\n  - content: 10.0.0.11 ${storage_ip}\n";
        assert_eq!(client.user_data(&system_id), Some(STANDARD.encode(expected)));
        assert_eq!(client.power_credentials(&system_id).map(|c| c.power_pass), Some("secret".to_string()));
        assert!(!dir.path().join("maas-cloud-init/cloud-init-node-a.yaml").exists());

        assert_monotonic(a);
        assert_monotonic(b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_failure_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let client = MockMaasClient::new("admin");
        client.fail_operation_for(op::CREATE_MACHINE, "node-3", command_failure("MAC address already in use"));

        let pipeline = ProvisioningPipeline::new(
            Arc::new(client.clone()),
            Arc::new(ScriptedProbe::always()),
            2,
            pipeline_options(dir.path(), &template),
        );
        let nodes = (1..=5)
            .map(|i| node_with_ip(&format!("node-{}", i), &format!("10.0.0.{}", i)))
            .collect();
        let states = pipeline.run(nodes).await;

        let report = BatchReport::from_states(&states);
        assert_eq!(report.count(DeploymentStatus::Deployed), 4);
        assert_eq!(report.count(DeploymentStatus::SystemIdMissing), 1);
        assert_eq!(report.statuses[2], ("node-3".to_string(), DeploymentStatus::SystemIdMissing));
        for state in &states {
            assert_monotonic(state);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let client = MockMaasClient::new("admin");
        client.script_statuses(
            "not-ready",
            vec![MachineStatus::Commissioning, MachineStatus::FailedCommissioning],
        );
        client.script_statuses("slow", vec![MachineStatus::Ready, MachineStatus::Deploying]);
        client.script_statuses(
            "broken",
            vec![MachineStatus::Ready, MachineStatus::Deploying, MachineStatus::FailedDeployment],
        );
        client.fail_operation_for(op::CREATE_MACHINE, "missing", command_failure("boom"));

        let mut bad_template = node_with_ip("no-template", "10.0.0.6");
        bad_template.cloud_init_template = Some(dir.path().join("absent.yaml"));

        let pipeline = ProvisioningPipeline::new(
            Arc::new(client.clone()),
            Arc::new(ScriptedProbe::always()),
            3,
            pipeline_options(dir.path(), &template),
        );
        let states = pipeline
            .run(vec![
                node_with_ip("good", "10.0.0.1"),
                node_with_ip("not-ready", "10.0.0.2"),
                node_with_ip("slow", "10.0.0.3"),
                node_with_ip("broken", "10.0.0.4"),
                node_with_ip("missing", "10.0.0.5"),
                bad_template,
            ])
            .await;

        let statuses: Vec<_> = states.iter().map(|s| s.deployment_status).collect();
        assert_eq!(
            statuses,
            vec![
                Some(DeploymentStatus::Deployed),
                Some(DeploymentStatus::NotReady),
                Some(DeploymentStatus::DeploymentTimeout),
                Some(DeploymentStatus::DeploymentTimeout),
                Some(DeploymentStatus::SystemIdMissing),
                Some(DeploymentStatus::DeployFailed),
            ]
        );
        for state in &states {
            assert_monotonic(state);
        }

        // Nothing after the failed stage ran
        let not_ready = client.system_id_of("not-ready").unwrap();
        assert!(!client.calls_for(&not_ready).contains(&op::DEPLOY_MACHINE.to_string()));
        let no_template = client.system_id_of("no-template").unwrap();
        assert!(!client.calls_for(&no_template).contains(&op::DEPLOY_MACHINE.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_read_failure_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let client = MockMaasClient::new("admin");
        client.fail_operation(op::READ_MACHINE, command_failure("connection refused"));

        let pipeline = ProvisioningPipeline::new(
            Arc::new(client.clone()),
            Arc::new(ScriptedProbe::always()),
            1,
            pipeline_options(dir.path(), &template),
        );
        let states = pipeline.run(vec![node("node-1")]).await;

        assert_eq!(states[0].deployment_status, Some(DeploymentStatus::NotReady));
        let system_id = states[0].system_id.clone().unwrap();
        // Unknown fails fast: a single read
        let reads = client.calls_for(&system_id).iter().filter(|c| *c == op::READ_MACHINE).count();
        assert_eq!(reads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_failure_removes_preserved_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let client = MockMaasClient::new("admin");
        client.fail_operation(op::DEPLOY_MACHINE, command_failure("No available OS images"));

        let mut options = pipeline_options(dir.path(), &template);
        options.preserve_artifacts = true;
        let pipeline = ProvisioningPipeline::new(Arc::new(client), Arc::new(ScriptedProbe::always()), 1, options);
        let states = pipeline.run(vec![node("node-1")]).await;

        assert_eq!(states[0].deployment_status, Some(DeploymentStatus::DeployFailed));
        assert_eq!(states[0].lifecycle, NodeLifecycle::Failed("deploy failed".to_string()));
        assert!(states[0].artifact.is_none());
        assert!(!dir.path().join("maas-cloud-init/cloud-init-node-1.yaml").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preserved_artifact_uses_row_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let row_template = dir.path().join("row.yaml");
        std::fs::write(&row_template, "storage: $storage_ip\n").unwrap();

        let mut custom = node_with_ip("node-1", "10.0.0.21");
        custom.cloud_init_template = Some(row_template);
        custom.storage_ip = Some("192.168.50.21".to_string());

        let mut options = pipeline_options(dir.path(), &template);
        options.preserve_artifacts = true;
        let pipeline = ProvisioningPipeline::new(
            Arc::new(MockMaasClient::new("admin")),
            Arc::new(ScriptedProbe::always()),
            1,
            options,
        );
        let states = pipeline.run(vec![custom]).await;

        let artifact = states[0].artifact.clone().unwrap();
        assert_eq!(std::fs::read_to_string(artifact).unwrap(), "storage: 192.168.50.21\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_and_credential_failure_still_deployed() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let client = MockMaasClient::new("admin");
        client.fail_operation(op::UPDATE_MACHINE, command_failure("BMC rejected credentials"));
        let probe = Arc::new(ScriptedProbe::never());

        let pipeline = ProvisioningPipeline::new(
            Arc::new(client),
            probe.clone(),
            1,
            pipeline_options(dir.path(), &template),
        );
        let states = pipeline.run(vec![node("node-1")]).await;

        assert_eq!(states[0].deployment_status, Some(DeploymentStatus::DeployedUnreachable));
        assert_eq!(states[0].lifecycle, NodeLifecycle::Unreachable);
        assert_eq!(probe.attempts(), 6);
        assert_monotonic(&states[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_layout_failure_leaves_status() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let layout = dir.path().join("layout.json");
        std::fs::write(
            &layout,
            r#"{"volumes": [{"name": "root", "size": "8G", "mount_point": "/"}, {"name": "swap", "size": "2G"}]}"#,
        )
        .unwrap();

        let run = |client: MockMaasClient| {
            let mut options = pipeline_options(dir.path(), &template);
            options.storage_layout = Some(StorageLayoutOptions {
                template: Some(layout.clone()),
                log_dir: dir.path().join("storage_layout_logs"),
            });
            ProvisioningPipeline::new(Arc::new(client), Arc::new(ScriptedProbe::always()), 1, options)
        };

        let healthy = MockMaasClient::new("admin");
        let states = run(healthy.clone()).run(vec![node("node-1")]).await;
        assert_eq!(states[0].deployment_status, Some(DeploymentStatus::Deployed));
        let system_id = states[0].system_id.clone().unwrap();
        let groups = healthy.volume_groups(&system_id);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].logical_volumes.len(), 2);

        let failing = MockMaasClient::new("admin");
        failing.fail_operation(op::CREATE_VOLUME_GROUP, command_failure("disk busy"));
        let states = run(failing.clone()).run(vec![node("node-2")]).await;
        assert_eq!(states[0].deployment_status, Some(DeploymentStatus::Deployed));

        let logs: Vec<_> = std::fs::read_dir(dir.path().join("storage_layout_logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("node-2_"))
            .collect();
        assert_eq!(logs.len(), 1);
        assert!(std::fs::read_to_string(&logs[0]).unwrap().contains("Configuration failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_layout_leaves_status() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let layout = dir.path().join("layout.json");
        std::fs::write(
            &layout,
            r#"{"volumes": [{"name": "a", "size": "9000000T"}, {"name": "b", "size": "9000000T"}]}"#,
        )
        .unwrap();

        let client = MockMaasClient::new("admin");
        let mut options = pipeline_options(dir.path(), &template);
        options.storage_layout = Some(StorageLayoutOptions {
            template: Some(layout),
            log_dir: dir.path().join("storage_layout_logs"),
        });
        let pipeline = ProvisioningPipeline::new(Arc::new(client.clone()), Arc::new(ScriptedProbe::always()), 1, options);

        let states = pipeline.run(vec![node("node-1")]).await;

        assert_eq!(states[0].deployment_status, Some(DeploymentStatus::Deployed));
        let system_id = states[0].system_id.clone().unwrap();
        let calls = client.calls_for(&system_id);
        assert!(!calls.iter().any(|c| c == op::LIST_VOLUME_GROUPS));
        assert!(client.volume_groups(&system_id).is_empty());

        let log = std::fs::read_dir(dir.path().join("storage_layout_logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .next()
            .unwrap();
        assert!(std::fs::read_to_string(log).unwrap().contains("Configuration failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_batch_records_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_cloud_init_template(dir.path());
        let client = MockMaasClient::new("admin");
        client.fail_operation_for(op::CREATE_MACHINE, "node-2", command_failure("boom"));

        let mut batch = batch_with_statuses(&[("node-1", "10.0.0.1", None), ("node-2", "10.0.0.2", None)]);
        let pipeline = ProvisioningPipeline::new(
            Arc::new(client),
            Arc::new(ScriptedProbe::always()),
            4,
            pipeline_options(dir.path(), &template),
        );
        let report = pipeline.provision_batch(&mut batch).await;

        assert_eq!(batch.rows[0].status, Some(DeploymentStatus::Deployed));
        assert_eq!(batch.rows[1].status, Some(DeploymentStatus::SystemIdMissing));
        assert_eq!(report.statuses.len(), 2);
    }
}

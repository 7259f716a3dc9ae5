//! Hand-off to the node onboarding toolchain
//!
//! After the batch finishes, every node that ended `Deployed` is written into
//! a vars document and the toolchain's `pcdExpress` steps are run against it.

use crate::error::ProvisionError;
use handlebars::Handlebars;
use inventory::{Batch, DeploymentStatus};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

pub const ONBOARD_ROLE: &str = "node_onboard";
pub const HOST_DATA_TEMPLATE: &str = "user_resource_examples/templates/host_onboard_data.yaml.j2";

/// Inventory entry for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardHost {
    pub ansible_ssh_user: String,
    pub ansible_ssh_private_key_file: String,
    pub roles: Vec<String>,
}

/// Deployed, addressable hosts keyed by IP
pub fn select_hosts(batch: &Batch, ssh_user: &str, ssh_key: &Path) -> Result<BTreeMap<String, OnboardHost>, ProvisionError> {
    let hosts: BTreeMap<String, OnboardHost> = batch
        .rows
        .iter()
        .filter(|row| row.status == Some(DeploymentStatus::Deployed) && !row.node.ip.is_empty())
        .map(|row| {
            (
                row.node.ip.clone(),
                OnboardHost {
                    ansible_ssh_user: ssh_user.to_string(),
                    ansible_ssh_private_key_file: ssh_key.display().to_string(),
                    roles: vec![ONBOARD_ROLE.to_string()],
                },
            )
        })
        .collect();

    if hosts.is_empty() {
        return Err(ProvisionError::Onboarding("No hosts to onboard".to_string()));
    }
    Ok(hosts)
}

/// Render the vars document; the result must be valid YAML
pub fn render_vars(
    template: &str,
    url: &str,
    region: &str,
    environment: &str,
    hosts: &BTreeMap<String, OnboardHost>,
) -> Result<String, ProvisionError> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("vars", template)
        .map_err(|e| ProvisionError::Template(e.to_string()))?;

    let rendered = handlebars
        .render(
            "vars",
            &json!({
                "url": url,
                "cloud": region,
                "environment": environment,
                "hosts": hosts,
            }),
        )
        .map_err(|e| ProvisionError::Template(e.to_string()))?;

    serde_yaml::from_str::<serde_yaml::Value>(&rendered)
        .map_err(|e| ProvisionError::Template(format!("rendered vars are not valid YAML: {}", e)))?;
    Ok(rendered)
}

/// Settings for one toolchain run
#[derive(Debug, Clone)]
pub struct OnboardingRun {
    pub dir: PathBuf,
    /// Usually `./pcdExpress`, resolved inside `dir`
    pub program: PathBuf,
    pub portal: String,
    pub region: String,
    pub environment: String,
    pub url: String,
    pub setup_env: bool,
    pub controller_ip: Option<String>,
}

impl OnboardingRun {
    fn env_file(&self) -> String {
        format!(
            "user_configs/{p}/{r}/{p}-{r}-{e}-environment.yaml",
            p = self.portal,
            r = self.region,
            e = self.environment
        )
    }

    /// Arguments of each toolchain step, in order
    pub fn steps(&self) -> Vec<Vec<String>> {
        let mut setup = vec![
            "-portal".to_string(),
            self.portal.clone(),
            "-region".to_string(),
            self.region.clone(),
            "-env".to_string(),
            self.environment.clone(),
            "-url".to_string(),
            self.url.clone(),
            "-ostype".to_string(),
            "ubuntu".to_string(),
            "-setup-environment".to_string(),
            if self.setup_env { "yes" } else { "no" }.to_string(),
        ];
        if let Some(ip) = &self.controller_ip {
            setup.push("-controller-ip".to_string());
            setup.push(ip.clone());
        }

        let env_file = self.env_file();
        let nodes_data = format!(
            "user_configs/{p}/{r}/node-onboarding/{p}-{r}-nodesdata.yaml",
            p = self.portal,
            r = self.region
        );
        vec![
            setup,
            vec!["-env-file".to_string(), env_file.clone(), "-render-userconfig".to_string(), nodes_data],
            vec!["-env-file".to_string(), env_file.clone(), "-create-hostagents-configs".to_string(), "yes".to_string()],
            vec!["-env-file".to_string(), env_file, "-apply-hosts-onboard".to_string(), "yes".to_string()],
        ]
    }
}

/// Copy the vars document into the toolchain and run its steps; the first failing step aborts
pub async fn run_toolchain(run: &OnboardingRun, vars_path: &Path) -> Result<(), ProvisionError> {
    let host_data = run.dir.join(HOST_DATA_TEMPLATE);
    if let Some(parent) = host_data.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(vars_path, &host_data).await?;

    for (index, args) in run.steps().into_iter().enumerate() {
        info!("Onboarding step {}: {} {}", index + 1, run.program.display(), args.join(" "));
        let status = Command::new(&run.program)
            .args(&args)
            .current_dir(&run.dir)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| ProvisionError::Onboarding(format!("cannot run {}: {}", run.program.display(), e)))?;
        if !status.success() {
            return Err(ProvisionError::Onboarding(format!(
                "step {} exited with {}",
                index + 1,
                status
            )));
        }
    }
    info!("Onboarding completed");
    Ok(())
}

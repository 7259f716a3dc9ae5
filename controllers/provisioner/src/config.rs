//! Command-line configuration
//!
//! Every option can also be given through the environment.

use crate::error::ProvisionError;
use crate::pipeline::{PipelineOptions, PipelineTimings, StorageLayoutOptions};
use clap::{Parser, ValueEnum};
use inventory::batch::CLOUD_INIT_COLUMN;
use inventory::LayoutTemplate;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn is_yes(self) -> bool {
        self == YesNo::Yes
    }
}

/// Add and deploy MAAS machines from a CSV file, then onboard them.
#[derive(Debug, Clone, Parser)]
#[command(name = "maas-provisioner")]
#[command(about = "Add and deploy MAAS machines from a CSV file, then onboard the deployed nodes")]
pub struct Config {
    /// MAAS CLI profile
    #[arg(long = "maas-user", alias = "maas_user", env = "MAAS_USER")]
    pub maas_user: String,

    /// Batch CSV, one row per node
    #[arg(long = "csv-filename", alias = "csv_filename", env = "CSV_FILENAME")]
    pub csv_filename: PathBuf,

    /// Cloud-init template; optional when the CSV has a `cloud_init` column
    #[arg(long = "cloud-init-template", alias = "cloud_init_template", env = "CLOUD_INIT_TEMPLATE")]
    pub cloud_init_template: Option<PathBuf>,

    /// Portal name
    #[arg(long, env = "PORTAL")]
    pub portal: String,

    /// Region (site) name
    #[arg(long, env = "REGION")]
    pub region: String,

    /// Environment name used to group hosts
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: String,

    /// Portal URL
    #[arg(long, env = "PORTAL_URL")]
    pub url: String,

    /// SSH user for connectivity checks and onboarding
    #[arg(long = "ssh-user", alias = "ssh_user", env = "SSH_USER")]
    pub ssh_user: String,

    /// SSH private key (default: $HOME/.ssh/id_rsa)
    #[arg(long = "ssh-key", env = "SSH_KEY")]
    pub ssh_key: Option<PathBuf>,

    /// Maximum number of nodes processed concurrently
    #[arg(long = "max-workers", alias = "max_workers", env = "MAX_WORKERS", default_value_t = 4)]
    pub max_workers: usize,

    /// Keep the generated cloud-init files
    #[arg(long = "preserve-cloud-init", alias = "preserve_cloud_init", value_enum, default_value = "no")]
    pub preserve_cloud_init: YesNo,

    /// Set up the onboarding toolchain environment
    #[arg(long = "setup-env", alias = "setup_env", value_enum, default_value = "no")]
    pub setup_env: YesNo,

    /// Rebuild the storage layout of deployed machines
    #[arg(long = "storage-layout", alias = "storage_layout", value_enum, default_value = "no")]
    pub storage_layout: YesNo,

    /// Storage layout template (JSON or YAML)
    #[arg(long = "storage-layout-template", alias = "storage_layout_template", env = "STORAGE_LAYOUT_TEMPLATE")]
    pub storage_layout_template: Option<PathBuf>,

    /// On-premises installation
    #[arg(long, value_enum, default_value = "no")]
    pub onprem: YesNo,

    /// Controller IP, required on-premises
    #[arg(long = "controller-ip", alias = "controller_ip", env = "CONTROLLER_IP")]
    pub controller_ip: Option<String>,

    /// Stop after writing the updated CSV
    #[arg(long = "skip-onboarding", env = "SKIP_ONBOARDING")]
    pub skip_onboarding: bool,

    /// Onboarding vars template
    #[arg(long = "vars-template", env = "VARS_TEMPLATE", default_value = "vars_template.hbs")]
    pub vars_template: PathBuf,

    /// Onboarding toolchain directory
    #[arg(long = "onboarding-dir", env = "ONBOARDING_DIR", default_value = "pcd_ansible-pcd_develop")]
    pub onboarding_dir: PathBuf,

    /// Deployment log directory
    #[arg(long = "log-dir", env = "LOG_DIR", default_value = "deploy_logs")]
    pub log_dir: PathBuf,

    /// Per-node storage layout log directory
    #[arg(long = "storage-log-dir", env = "STORAGE_LOG_DIR", default_value = "storage_layout_logs")]
    pub storage_log_dir: PathBuf,

    /// Directory for generated cloud-init files
    #[arg(long = "artifact-dir", env = "ARTIFACT_DIR", default_value = "maas-cloud-init")]
    pub artifact_dir: PathBuf,
}

impl Config {
    /// Pre-flight checks; any failure aborts the run before node work starts
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.max_workers == 0 {
            return Err(ProvisionError::InvalidConfig("--max-workers must be at least 1".to_string()));
        }

        if !self.csv_filename.is_file() {
            return Err(ProvisionError::InvalidConfig(format!(
                "The CSV file '{}' does not exist.",
                self.csv_filename.display()
            )));
        }

        match &self.cloud_init_template {
            Some(template) => require_file(template, "cloud-init template")?,
            None => {
                let headers = inventory::read_headers(&self.csv_filename)?;
                if !headers.iter().any(|h| h == CLOUD_INIT_COLUMN) {
                    return Err(ProvisionError::InvalidConfig(
                        "No cloud-init template provided and 'cloud_init' column is missing from the CSV.".to_string(),
                    ));
                }
            }
        }

        if self.storage_layout.is_yes() {
            let template = self.storage_layout_template.as_ref().ok_or_else(|| {
                ProvisionError::InvalidConfig("--storage-layout-template is required with --storage-layout yes".to_string())
            })?;
            require_file(template, "storage layout template")?;
            LayoutTemplate::load(template)
                .and_then(|t| t.validate())
                .map_err(ProvisionError::from_inventory)?;
        }

        if self.onprem.is_yes() && self.controller_ip.as_deref().is_none_or(str::is_empty) {
            return Err(ProvisionError::InvalidConfig("controller IP is required".to_string()));
        }

        if !self.skip_onboarding {
            require_file(&self.vars_template, "template file")?;
            if !self.onboarding_dir.is_dir() {
                return Err(ProvisionError::InvalidConfig(format!(
                    "Directory {} does not exist.",
                    self.onboarding_dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        match &self.ssh_key {
            Some(path) => path.clone(),
            None => {
                let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
                home.join(".ssh").join("id_rsa")
            }
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            cloud_init_template: self.cloud_init_template.clone(),
            artifact_dir: self.artifact_dir.clone(),
            preserve_artifacts: self.preserve_cloud_init.is_yes(),
            storage_layout: self.storage_layout.is_yes().then(|| StorageLayoutOptions {
                template: self.storage_layout_template.clone(),
                log_dir: self.storage_log_dir.clone(),
            }),
            timings: PipelineTimings::default(),
        }
    }
}

fn require_file(path: &Path, what: &str) -> Result<(), ProvisionError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProvisionError::InvalidConfig(format!(
            "The {} '{}' does not exist.",
            what,
            path.display()
        )))
    }
}

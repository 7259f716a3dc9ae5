//! MAAS Batch Provisioner
//!
//! Adds and deploys bare-metal machines listed in a CSV file:
//! - Creates every machine in MAAS, waits for commissioning, deploys with a
//!   per-node cloud-init document and verifies SSH reachability
//! - Optionally rebuilds each deployed machine's storage layout from a template
//! - Writes `<csv>_updated.csv` with a `deployment_status` column
//! - Hands the deployed hosts to the onboarding toolchain

mod cloud_init;
mod config;
mod connectivity;
mod error;
mod logging;
mod onboarding;
mod pipeline;
mod poller;
mod state;
mod storage_layout;
mod worker_pool;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod pipeline_test;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use connectivity::SshProbe;
use maas_client::MaasClient;
use onboarding::OnboardingRun;
use pipeline::ProvisioningPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const ONBOARDING_PROGRAM: &str = "./pcdExpress";
const VARS_FILE: &str = "vars.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    let _guard = logging::init(&config.log_dir).context("Failed to set up logging")?;

    info!("Starting MAAS Batch Provisioner");
    config.validate().context("Pre-flight checks failed")?;

    info!("Configuration:");
    info!("  MAAS profile: {}", config.maas_user);
    info!("  CSV: {}", config.csv_filename.display());
    info!("  Workers: {}", config.max_workers);
    info!("  Storage layout: {}", if config.storage_layout.is_yes() { "yes" } else { "no" });

    let mut batch = inventory::read_batch(&config.csv_filename)
        .with_context(|| format!("Failed to read {}", config.csv_filename.display()))?;
    info!("Loaded {} nodes", batch.rows.len());

    let ssh_key = config.ssh_key_path();
    let pipeline = ProvisioningPipeline::new(
        Arc::new(MaasClient::new(config.maas_user.clone())),
        Arc::new(SshProbe::new(config.ssh_user.clone(), ssh_key.clone())),
        config.max_workers,
        config.pipeline_options(),
    );
    let report = pipeline.provision_batch(&mut batch).await;
    report.log_summary();

    let updated = inventory::write_batch(&config.csv_filename, &batch).context("Failed to write the updated CSV")?;
    info!("Updated CSV saved to {}", updated.display());

    if config.skip_onboarding {
        info!("Skipping onboarding");
        return Ok(());
    }

    let hosts = onboarding::select_hosts(&batch, &config.ssh_user, &ssh_key)?;
    let template = tokio::fs::read_to_string(&config.vars_template)
        .await
        .with_context(|| format!("Failed to read {}", config.vars_template.display()))?;
    let vars = onboarding::render_vars(&template, &config.url, &config.region, &config.environment, &hosts)?;
    let vars_path = PathBuf::from(VARS_FILE);
    tokio::fs::write(&vars_path, vars).await.context("Failed to write vars.yaml")?;
    info!("vars.yaml generated for {} hosts", hosts.len());

    let run = OnboardingRun {
        dir: config.onboarding_dir.clone(),
        program: PathBuf::from(ONBOARDING_PROGRAM),
        portal: config.portal.clone(),
        region: config.region.clone(),
        environment: config.environment.clone(),
        url: config.url.clone(),
        setup_env: config.setup_env.is_yes(),
        controller_ip: config.onprem.is_yes().then(|| config.controller_ip.clone()).flatten(),
    };
    let vars_path = std::fs::canonicalize(&vars_path).context("Failed to resolve vars.yaml")?;
    onboarding::run_toolchain(&run, &vars_path).await.context("Onboarding failed")?;

    Ok(())
}

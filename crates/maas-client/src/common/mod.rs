//! Common utilities for the MAAS CLI client
//!
//! Provides the process wrapper every operation goes through.

pub mod params;

use crate::error::MaasError;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Operation names, used in error reports and by the mock for failure injection
pub mod op {
    pub const CREATE_MACHINE: &str = "machines create";
    pub const READ_MACHINE: &str = "machine read";
    pub const UPDATE_MACHINE: &str = "machine update";
    pub const DEPLOY_MACHINE: &str = "machine deploy";
    pub const LIST_BLOCK_DEVICES: &str = "block-devices read";
    pub const DELETE_BLOCK_DEVICE: &str = "block-device delete";
    pub const FORMAT_BLOCK_DEVICE: &str = "block-device format";
    pub const MOUNT_BLOCK_DEVICE: &str = "block-device mount";
    pub const LIST_PARTITIONS: &str = "partitions read";
    pub const CREATE_PARTITION: &str = "partitions create";
    pub const DELETE_PARTITION: &str = "partition delete";
    pub const FORMAT_PARTITION: &str = "partition format";
    pub const MOUNT_PARTITION: &str = "partition mount";
    pub const LIST_VOLUME_GROUPS: &str = "volume-groups read";
    pub const READ_VOLUME_GROUP: &str = "volume-group read";
    pub const CREATE_VOLUME_GROUP: &str = "volume-groups create";
    pub const DELETE_VOLUME_GROUP: &str = "volume-group delete";
    pub const CREATE_LOGICAL_VOLUME: &str = "volume-group create-logical-volume";
}

/// Process wrapper around `maas <profile> <resource> <action> ...`
#[derive(Debug, Clone)]
pub struct MaasCli {
    binary: String,
    profile: String,
    timeout: Duration,
}

impl MaasCli {
    /// Create a new CLI wrapper
    pub fn new(binary: impl Into<String>, profile: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            profile: profile.into(),
            timeout,
        }
    }

    /// Get the profile name
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Run an operation and return its stdout.
    ///
    /// `operation` is `"<resource> <action>"`; `args` follow it on the command
    /// line (positional ids first, then `key=value` parameters).
    pub async fn run(&self, operation: &str, args: &[String]) -> Result<String, MaasError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(&self.profile)
            .args(operation.split_whitespace())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("maas {} {} {}", self.profile, operation, redact(args).join(" "));

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| MaasError::Timeout {
                operation: operation.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            if stderr.to_lowercase().contains("not found") {
                return Err(MaasError::NotFound(format!("{}: {}", operation, stderr)));
            }
            return Err(MaasError::Command {
                operation: operation.to_string(),
                exit_code: output.status.code(),
                stderr: if stderr.is_empty() { stdout.trim().to_string() } else { stderr },
            });
        }

        if !stderr.is_empty() {
            debug!("maas {} stderr: {}", operation, stderr);
        }

        Ok(stdout)
    }

    /// Run an operation and decode its JSON answer
    pub async fn run_json<T: DeserializeOwned>(&self, operation: &str, args: &[String]) -> Result<T, MaasError> {
        let stdout = self.run(operation, args).await?;
        if stdout.trim().is_empty() {
            return Err(MaasError::InvalidResponse(format!("{} returned no output", operation)));
        }
        serde_json::from_str(&stdout).map_err(|e| {
            MaasError::InvalidResponse(format!(
                "error decoding {} output: {} - Output (first 500 chars): {}",
                operation,
                e,
                stdout.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Run an operation whose answer is not needed
    pub async fn run_unit(&self, operation: &str, args: &[String]) -> Result<(), MaasError> {
        self.run(operation, args).await.map(|_| ())
    }
}

/// Mask secrets before an argument list reaches the debug log
fn redact(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if arg.starts_with("power_parameters=") {
                "power_parameters=<redacted>".to_string()
            } else if arg.starts_with("user_data=") {
                "user_data=<base64>".to_string()
            } else {
                arg.clone()
            }
        })
        .collect()
}

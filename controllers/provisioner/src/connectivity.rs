//! Post-deploy reachability checks
//!
//! A deployed node counts as reachable once a remote shell on it answers.
//! `SshProbe` shells out to `ssh`; tests substitute their own probe.

use crate::error::ProvisionError;
use crate::poller::WaitPolicy;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

const SSH_MARKER: &str = "SSH_OK";

/// One reachability attempt against a node
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, ip: &str) -> bool;
}

/// Probe that runs `echo SSH_OK` over ssh
#[derive(Debug, Clone)]
pub struct SshProbe {
    pub ssh_user: String,
    pub private_key: PathBuf,
    pub connect_timeout: Duration,
}

impl SshProbe {
    pub fn new(ssh_user: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            ssh_user: ssh_user.into(),
            private_key: private_key.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    fn command(&self, ip: &str) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()))
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-i")
            .arg(&self.private_key)
            .arg(format!("{}@{}", self.ssh_user, ip))
            .arg("echo")
            .arg(SSH_MARKER)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ReachabilityProbe for SshProbe {
    async fn probe(&self, ip: &str) -> bool {
        // Allow the remote command a little time beyond the connect timeout
        let limit = self.connect_timeout + Duration::from_secs(5);
        match tokio::time::timeout(limit, self.command(ip).output()).await {
            Ok(Ok(output)) => {
                output.status.success() && String::from_utf8_lossy(&output.stdout).contains(SSH_MARKER)
            }
            Ok(Err(e)) => {
                info!("SSH check raised error: {}. Retrying...", e);
                false
            }
            Err(_) => {
                info!("SSH check timed out after {}s. Retrying...", limit.as_secs());
                false
            }
        }
    }
}

/// Retry `probe` every `policy.interval` until it succeeds or `policy.timeout` elapses.
/// Returns the number of attempts it took.
pub async fn verify_connectivity(
    probe: &dyn ReachabilityProbe,
    hostname: &str,
    ip: &str,
    policy: WaitPolicy,
) -> Result<u32, ProvisionError> {
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0;
    loop {
        attempts += 1;
        if probe.probe(ip).await {
            info!("[{}] SSH connectivity verified.", hostname);
            return Ok(attempts);
        }
        info!("[{}] SSH not ready yet. Retrying...", hostname);
        sleep(policy.interval).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    warn!(
        "[{}] SSH connectivity check failed after {}s.",
        hostname,
        policy.timeout.as_secs()
    );
    Err(ProvisionError::ConnectivityUnverified {
        host: hostname.to_string(),
        waited_secs: policy.timeout.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedProbe;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let probe = ScriptedProbe::succeed_on(2);
        let start = Instant::now();

        let attempts = verify_connectivity(&probe, "node-1", "10.0.0.11", WaitPolicy::from_secs(30, 5))
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(probe.targets(), vec!["10.0.0.11", "10.0.0.11"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_timeout() {
        let probe = ScriptedProbe::never();
        let start = Instant::now();

        let err = verify_connectivity(&probe, "node-1", "10.0.0.11", WaitPolicy::from_secs(30, 5))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ConnectivityUnverified { waited_secs: 30, .. }));
        assert_eq!(probe.attempts(), 6);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_ssh_command_shape() {
        let probe = SshProbe::new("ubuntu", "/home/ops/.ssh/id_rsa");
        let command = probe.command("10.0.0.11");
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"ubuntu@10.0.0.11".to_string()));
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("SSH_OK"));
    }
}

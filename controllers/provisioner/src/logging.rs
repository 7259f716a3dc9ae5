//! Logging setup
//!
//! The run logs to stdout and `<log_dir>/maas_deployment.log`. Storage layout
//! work additionally gets one file per node through `StorageLog`, an explicit
//! logger handed to the storage engine.

use crate::error::ProvisionError;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::dispatcher::{self, Dispatch};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEPLOYMENT_LOG_FILE: &str = "maas_deployment.log";

/// Install the global subscriber. Keep the returned guard alive for the whole
/// run so buffered file output is flushed on exit.
pub fn init(log_dir: &Path) -> Result<WorkerGuard, ProvisionError> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::never(log_dir, DEPLOYMENT_LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| ProvisionError::InvalidConfig(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}

/// Per-node storage layout log
///
/// Lines go to `<dir>/<hostname>_<YYYYMMDD_HHMMSS>.log` and are mirrored to
/// the global log.
#[derive(Debug, Clone)]
pub struct StorageLog {
    hostname: String,
    path: PathBuf,
    dispatch: Dispatch,
}

impl StorageLog {
    pub fn create(dir: &Path, hostname: &str) -> Result<Self, ProvisionError> {
        std::fs::create_dir_all(dir)?;
        let file_name = format!("{}_{}.log", hostname, chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(&file_name);

        let subscriber = fmt()
            .with_ansi(false)
            .with_target(false)
            .with_max_level(Level::INFO)
            .with_writer(tracing_appender::rolling::never(dir, &file_name))
            .finish();

        Ok(Self {
            hostname: hostname.to_string(),
            path,
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn info(&self, message: impl Display) {
        let line = format!("{}: {}", self.hostname, message);
        dispatcher::with_default(&self.dispatch, || tracing::info!("{}", line));
        tracing::info!("{}", line);
    }

    pub fn warn(&self, message: impl Display) {
        let line = format!("{}: {}", self.hostname, message);
        dispatcher::with_default(&self.dispatch, || tracing::warn!("{}", line));
        tracing::warn!("{}", line);
    }

    pub fn error(&self, message: impl Display) {
        let line = format!("{}: {}", self.hostname, message);
        dispatcher::with_default(&self.dispatch, || tracing::error!("{}", line));
        tracing::error!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_log_writes_per_node_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = StorageLog::create(dir.path(), "node-1").unwrap();

        log.info("Starting storage configuration");
        log.warn("No boot disk found");

        let name = log.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("node-1_") && name.ends_with(".log"), "{}", name);

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("node-1: Starting storage configuration"));
        assert!(contents.contains("WARN"));
        assert!(contents.contains("node-1: No boot disk found"));
    }

    #[test]
    fn test_storage_logs_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let first = StorageLog::create(dir.path(), "node-1").unwrap();
        let second = StorageLog::create(dir.path(), "node-2").unwrap();

        first.info("only in first");
        second.info("only in second");

        assert!(!std::fs::read_to_string(first.path()).unwrap().contains("only in second"));
        assert!(!std::fs::read_to_string(second.path()).unwrap().contains("only in first"));
    }
}

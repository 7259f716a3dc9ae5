//! MAAS client errors

use thiserror::Error;

/// Errors that can occur when driving the MAAS CLI
#[derive(Debug, Error)]
pub enum MaasError {
    /// The CLI exited non-zero or reported an error on stderr
    #[error("MAAS command '{operation}' failed (exit code {exit_code:?}): {stderr}")]
    Command {
        operation: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The CLI did not answer within the per-call timeout
    #[error("MAAS command '{operation}' timed out after {timeout_secs}s")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    /// The CLI binary could not be spawned
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The CLI answered with something we cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl MaasError {
    /// Whether the error text means the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            MaasError::NotFound(_) => true,
            MaasError::Command { stderr, .. } => stderr.to_lowercase().contains("not found"),
            _ => false,
        }
    }
}

/// Idempotent-delete convention for MAAS reads and deletes.
///
/// A "not found" answer is an empty successful result: deleting something
/// that is already gone succeeds, listing children of a vanished parent
/// yields nothing.
pub trait NotFoundExt<T> {
    fn or_empty(self) -> Result<T, MaasError>;
}

impl<T: Default> NotFoundExt<T> for Result<T, MaasError> {
    fn or_empty(self) -> Result<T, MaasError> {
        match self {
            Err(e) if e.is_not_found() => Ok(T::default()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variant_becomes_empty() {
        let result: Result<Vec<u64>, MaasError> = Err(MaasError::NotFound("partition 7".to_string()));
        assert_eq!(result.or_empty().unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_not_found_stderr_becomes_empty() {
        let result: Result<(), MaasError> = Err(MaasError::Command {
            operation: "partition delete".to_string(),
            exit_code: Some(2),
            stderr: "Not Found: No Partition matches the given query.".to_string(),
        });
        assert!(result.or_empty().is_ok());
    }

    #[test]
    fn test_other_errors_propagate() {
        let result: Result<(), MaasError> = Err(MaasError::Command {
            operation: "volume-group delete".to_string(),
            exit_code: Some(1),
            stderr: "Cannot delete volume group while it is in use".to_string(),
        });
        assert!(result.or_empty().is_err());
    }
}

//! CLI error types.

use sidecar_pki::IssuanceError;

/// CLI-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid or unreadable profile configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// The issuance pipeline stopped at a step.
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
    /// A library operation outside the pipeline failed.
    #[error(transparent)]
    Pki(#[from] sidecar_pki::Error),
    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_pki::Step;

    #[test]
    fn config_error_display() {
        let err = CliError::Config("leaf: validity_days must be > 0".into());
        assert_eq!(
            err.to_string(),
            "configuration error: leaf: validity_days must be > 0"
        );
    }

    #[test]
    fn issuance_error_keeps_step() {
        let err = CliError::from(IssuanceError {
            step: Step::ValidateInput,
            scope: None,
            source: sidecar_pki::Error::InputValidation("az must not be empty".into()),
        });
        assert_eq!(
            err.to_string(),
            "step 'validate input' failed: invalid input: az must not be empty"
        );
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert!(matches!(CliError::from(io_err), CliError::Io(_)));
    }
}

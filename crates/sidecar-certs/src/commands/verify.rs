//! Verify command implementation.

use std::io::Write;
use std::path::PathBuf;

use sidecar_pki::{Scope, VerificationReport, Workspace, verify_scope};

use crate::cli::ScopeArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Verify command executor.
pub struct VerifyCommand {
    root: PathBuf,
}

impl VerifyCommand {
    /// Create a new verify command reading under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Execute the verify command.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope is invalid, an artifact is missing or
    /// any check fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ScopeArgs,
    ) -> Result<(), CliError> {
        let report = self.verify(args)?;
        format.write(writer, &report)?;
        Ok(())
    }

    /// Check the scope's artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Pki`] with the first failing check.
    pub fn verify(&self, args: &ScopeArgs) -> Result<VerificationReport, CliError> {
        let scope = Scope::new(&args.az, &args.cluster)?;
        Ok(verify_scope(&Workspace::new(&self.root), &scope)?)
    }
}

//! Profiles command implementation.
//!
//! Shows the CA and leaf profiles a scope would be issued with, after
//! placeholder expansion.

use std::io::Write;

use sidecar_pki::{ProfileSet, Scope};

use crate::cli::ScopeArgs;
use crate::config::ProfileConfig;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Profiles command executor.
pub struct ProfilesCommand {
    profiles: ProfileConfig,
}

impl ProfilesCommand {
    /// Create a new profiles command.
    #[must_use]
    pub const fn new(profiles: ProfileConfig) -> Self {
        Self { profiles }
    }

    /// Execute the profiles command.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope or an expanded profile is invalid.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ScopeArgs,
    ) -> Result<(), CliError> {
        let set = self.resolve(args)?;
        format.write(writer, &set)?;
        Ok(())
    }

    /// Expand the configured profiles for the scope.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Pki`] if the scope or a profile is invalid.
    pub fn resolve(&self, args: &ScopeArgs) -> Result<ProfileSet, CliError> {
        let scope = Scope::new(&args.az, &args.cluster)?;
        Ok(self.profiles.profiles(&scope)?)
    }
}

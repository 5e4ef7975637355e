//! Issue command implementation.
//!
//! Runs the issuance pipeline for one scope: bootstrap or reuse the scope's
//! CA, generate the injector key and request, sign it and persist all five
//! artifacts.

use std::io::Write;
use std::path::PathBuf;

use sidecar_pki::{IssuanceOrchestrator, IssuanceReport, IssueOptions, Workspace};
use tracing::info;

use crate::cli::IssueArgs;
use crate::config::ProfileConfig;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Issue command executor.
pub struct IssueCommand {
    root: PathBuf,
    profiles: ProfileConfig,
}

impl IssueCommand {
    /// Create a new issue command writing under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, profiles: ProfileConfig) -> Self {
        Self {
            root: root.into(),
            profiles,
        }
    }

    /// Execute the issue command.
    ///
    /// # Errors
    ///
    /// Returns an error if any pipeline step or the output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &IssueArgs,
    ) -> Result<(), CliError> {
        let report = self.issue(args)?;
        format.write(writer, &report)?;
        Ok(())
    }

    /// Run the pipeline and return its report.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Issuance`] naming the failed step.
    pub fn issue(&self, args: &IssueArgs) -> Result<IssuanceReport, CliError> {
        let workspace = Workspace::new(&self.root).force(args.force);
        let orchestrator = IssuanceOrchestrator::new(workspace, self.profiles.clone());
        let options = IssueOptions {
            regenerate_ca: args.regenerate_ca,
        };

        info!(
            az = %args.scope.az,
            cluster = %args.scope.cluster,
            force = args.force,
            "issuing certificates"
        );
        let report = orchestrator.run(&args.scope.az, &args.scope.cluster, options)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_pki::{CaOutcome, KeyAlgorithm, Step};
    use tempfile::TempDir;

    use crate::cli::{Format, ScopeArgs};

    fn fast_profiles() -> ProfileConfig {
        let mut config = ProfileConfig::default();
        config.ca.key_algorithm = KeyAlgorithm::EcdsaP256;
        config.leaf.key_algorithm = KeyAlgorithm::EcdsaP256;
        config
    }

    fn args(az: &str, cluster: &str, force: bool) -> IssueArgs {
        IssueArgs {
            scope: ScopeArgs {
                az: az.into(),
                cluster: cluster.into(),
            },
            force,
            regenerate_ca: false,
        }
    }

    #[test]
    fn issues_into_normalized_scope() {
        let dir = TempDir::new().unwrap();
        let cmd = IssueCommand::new(dir.path(), fast_profiles());

        let report = cmd.issue(&args("US-West-2", "staging", false)).unwrap();
        assert_eq!(report.ca_outcome, CaOutcome::Bootstrapped);
        assert_eq!(report.path, dir.path().join("us-west-2").join("STAGING"));
        assert_eq!(report.artifacts.len(), 5);
    }

    #[test]
    fn second_run_needs_force() {
        let dir = TempDir::new().unwrap();
        let cmd = IssueCommand::new(dir.path(), fast_profiles());
        cmd.issue(&args("dc01", "blue", false)).unwrap();

        match cmd.issue(&args("dc01", "blue", false)) {
            Err(CliError::Issuance(err)) => assert_eq!(err.step, Step::ValidateInput),
            other => panic!("expected refusal, got {other:?}"),
        }

        let report = cmd.issue(&args("dc01", "blue", true)).unwrap();
        assert_eq!(report.ca_outcome, CaOutcome::Loaded);
        assert_eq!(report.leaf_serial, 3);
    }

    #[test]
    fn execute_writes_json_report() {
        let dir = TempDir::new().unwrap();
        let cmd = IssueCommand::new(dir.path(), fast_profiles());
        let mut out = Vec::new();

        cmd.execute(&mut out, &OutputFormat::new(Format::Json), &args("dc01", "red", false))
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["ca_outcome"], "bootstrapped");
        assert_eq!(json["leaf_serial"], 2);
    }
}

//! The fixed issuance pipeline for one scope.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::ca::CertAuthority;
use crate::csr::CsrBuilder;
use crate::error::Error;
use crate::keygen::{KeyGenerator, KeyPair};
use crate::profile::{ProfileSet, ProfileSource};
use crate::types::Certificate;
use crate::workspace::{Artifact, Scope, Workspace};

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Scope and profile validation, plus the overwrite preflight.
    ValidateInput,
    /// Scope directory creation.
    PrepareWorkspace,
    /// CA bootstrap or load.
    EnsureAuthority,
    /// Leaf key generation.
    GenerateLeafKey,
    /// Signing request construction.
    BuildRequest,
    /// Leaf signing.
    SignRequest,
    /// Writing artifacts.
    PersistArtifacts,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ValidateInput => "validate input",
            Self::PrepareWorkspace => "prepare workspace",
            Self::EnsureAuthority => "ensure certificate authority",
            Self::GenerateLeafKey => "generate leaf key",
            Self::BuildRequest => "build signing request",
            Self::SignRequest => "sign request",
            Self::PersistArtifacts => "persist artifacts",
        })
    }
}

/// A pipeline failure, tagged with the step and scope it happened in.
#[derive(Debug, thiserror::Error)]
#[error("step '{step}' failed{}: {source}", scope_suffix(.scope.as_ref()))]
pub struct IssuanceError {
    /// Step that failed.
    pub step: Step,
    /// Scope being issued, once validated.
    pub scope: Option<Scope>,
    /// Underlying error.
    #[source]
    pub source: Error,
}

fn scope_suffix(scope: Option<&Scope>) -> String {
    scope.map(|s| format!(" for {s}")).unwrap_or_default()
}

/// How the root was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaOutcome {
    /// No CA existed; a new root was created.
    Bootstrapped,
    /// The existing root was reused.
    Loaded,
    /// The existing root was explicitly replaced.
    Regenerated,
}

impl fmt::Display for CaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bootstrapped => "bootstrapped",
            Self::Loaded => "reused",
            Self::Regenerated => "regenerated",
        })
    }
}

/// Caller choices for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueOptions {
    /// Replace an existing CA root. Requires a forced workspace.
    pub regenerate_ca: bool,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct IssuanceReport {
    /// Scope issued for.
    pub scope: Scope,
    /// Scope directory.
    pub path: PathBuf,
    /// How the CA was obtained.
    pub ca_outcome: CaOutcome,
    /// CA subject.
    pub ca_subject: String,
    /// Files written in this run.
    pub artifacts: Vec<PathBuf>,
    /// Leaf subject.
    pub leaf_subject: String,
    /// Leaf serial number.
    pub leaf_serial: u64,
    /// Leaf expiry.
    pub leaf_not_after: DateTime<Utc>,
}

/// Drives validate → prepare → ensure CA → leaf key → request → sign,
/// persisting artifacts along the way and stopping at the first failure.
#[derive(Debug)]
pub struct IssuanceOrchestrator<P> {
    workspace: Workspace,
    profiles: P,
}

impl<P: ProfileSource> IssuanceOrchestrator<P> {
    /// Creates an orchestrator writing into `workspace`.
    pub const fn new(workspace: Workspace, profiles: P) -> Self {
        Self {
            workspace,
            profiles,
        }
    }

    /// Workspace this orchestrator writes into.
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Runs the pipeline for `(az, cluster)`.
    ///
    /// # Errors
    ///
    /// Returns an [`IssuanceError`] naming the failed step. Artifacts written
    /// before the failure are left in place.
    pub fn run(
        &self,
        az: &str,
        cluster: &str,
        options: IssueOptions,
    ) -> Result<IssuanceReport, IssuanceError> {
        let scope = Scope::new(az, cluster).map_err(|source| IssuanceError {
            step: Step::ValidateInput,
            scope: None,
            source,
        })?;
        let at = |step: Step| {
            let scope = scope.clone();
            move |source: Error| IssuanceError {
                step,
                scope: Some(scope),
                source,
            }
        };

        info!(%scope, "issuing sidecar injector certificate");

        let profiles = self
            .profiles
            .profiles_for(&scope)
            .map_err(at(Step::ValidateInput))?;
        self.preflight(&scope, options)
            .map_err(at(Step::ValidateInput))?;

        let dir = self
            .workspace
            .ensure_dir(&scope)
            .map_err(at(Step::PrepareWorkspace))?;

        let mut written = Vec::new();
        let (mut ca, ca_outcome) = self
            .ensure_authority(&scope, &profiles, options, &mut written)
            .map_err(|(step, source)| at(step)(source))?;

        let leaf_key = KeyGenerator::generate(profiles.leaf.key_algorithm())
            .map_err(at(Step::GenerateLeafKey))?;
        let request =
            CsrBuilder::build(&leaf_key, &profiles.leaf).map_err(at(Step::BuildRequest))?;

        for (artifact, contents) in [
            (Artifact::LeafKey, leaf_key.private_key().pem()),
            (Artifact::LeafCsr, request.pem()),
        ] {
            written.push(
                self.workspace
                    .write(&scope, artifact, contents.as_bytes())
                    .map_err(at(Step::PersistArtifacts))?,
            );
        }

        let leaf = ca
            .sign(&request, &profiles.leaf)
            .map_err(at(Step::SignRequest))?;
        written.push(
            self.workspace
                .write(&scope, Artifact::LeafCert, leaf.pem().as_bytes())
                .map_err(at(Step::PersistArtifacts))?,
        );

        let ca_subject = ca
            .root_certificate()
            .map(|root| root.subject().to_string())
            .unwrap_or_default();
        let leaf_serial = leaf.serial_u64().unwrap_or_default();

        info!(%scope, ca = %ca_outcome, serial = leaf_serial, "issuance complete");

        Ok(IssuanceReport {
            scope,
            path: dir,
            ca_outcome,
            ca_subject,
            artifacts: written,
            leaf_subject: leaf.subject().to_string(),
            leaf_serial,
            leaf_not_after: leaf.not_after(),
        })
    }

    /// Refuses the run before anything is written if it would have to
    /// overwrite artifacts without force mode.
    fn preflight(&self, scope: &Scope, options: IssueOptions) -> crate::Result<()> {
        let ws = &self.workspace;
        if ws.is_forced() {
            return Ok(());
        }
        if options.regenerate_ca {
            return Err(Error::InputValidation(
                "regenerating the CA requires force mode".into(),
            ));
        }
        for artifact in [Artifact::LeafKey, Artifact::LeafCsr, Artifact::LeafCert] {
            if ws.exists(scope, artifact) {
                return Err(Error::OverwriteRefused {
                    path: ws.path(scope, artifact),
                });
            }
        }
        match (
            ws.exists(scope, Artifact::CaKey),
            ws.exists(scope, Artifact::CaCert),
        ) {
            (true, false) | (false, true) => Err(Error::InvalidAuthority(format!(
                "incomplete CA material in {}; force mode regenerates it",
                ws.resolve(scope).display()
            ))),
            _ => Ok(()),
        }
    }

    fn ensure_authority(
        &self,
        scope: &Scope,
        profiles: &ProfileSet,
        options: IssueOptions,
        written: &mut Vec<PathBuf>,
    ) -> Result<(CertAuthority, CaOutcome), (Step, Error)> {
        let ws = &self.workspace;
        let ensure = |e| (Step::EnsureAuthority, e);
        let complete = ws.exists(scope, Artifact::CaKey) && ws.exists(scope, Artifact::CaCert);

        if complete && !options.regenerate_ca {
            let key = ws
                .read(scope, Artifact::CaKey)
                .and_then(|pem| KeyPair::from_pem(&pem))
                .map_err(ensure)?;
            let cert = ws
                .read(scope, Artifact::CaCert)
                .and_then(|pem| Certificate::from_pem(&pem))
                .map_err(ensure)?;
            let mut ca = CertAuthority::load(key, cert).map_err(ensure)?;

            // The previous leaf is the only record of the serials already used.
            if ws.exists(scope, Artifact::LeafCert) {
                let previous = ws
                    .read(scope, Artifact::LeafCert)
                    .and_then(|pem| Certificate::from_pem(&pem))
                    .map_err(|e| {
                        ensure(Error::InvalidAuthority(format!(
                            "cannot recover issued serials from {}: {e}; \
                             remove it or regenerate the CA",
                            ws.path(scope, Artifact::LeafCert).display()
                        )))
                    })?;
                ca.observe_issued(&previous).map_err(ensure)?;
            }
            return Ok((ca, CaOutcome::Loaded));
        }

        let mut ca = CertAuthority::new();
        let outcome = if complete {
            ca.rebootstrap(&profiles.ca).map_err(ensure)?;
            CaOutcome::Regenerated
        } else {
            ca.bootstrap(&profiles.ca).map_err(ensure)?;
            CaOutcome::Bootstrapped
        };

        if let (Some(key), Some(cert)) = (ca.root_key(), ca.root_certificate()) {
            for (artifact, contents) in [
                (Artifact::CaKey, key.private_key().pem()),
                (Artifact::CaCert, cert.pem()),
            ] {
                written.push(
                    ws.write(scope, artifact, contents.as_bytes())
                        .map_err(|e| (Step::PersistArtifacts, e))?,
                );
            }
        }

        Ok((ca, outcome))
    }
}

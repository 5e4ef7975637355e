//! Offline verification of a scope's persisted artifacts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::csr::SigningRequest;
use crate::error::{Error, Result};
use crate::keygen::KeyPair;
use crate::types::Certificate;
use crate::validation;
use crate::workspace::{Artifact, Scope, Workspace};

/// What was checked for a scope.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Scope verified.
    pub scope: Scope,
    /// CA subject.
    pub ca_subject: String,
    /// CA expiry.
    pub ca_not_after: DateTime<Utc>,
    /// Leaf subject.
    pub leaf_subject: String,
    /// Leaf serial number.
    pub leaf_serial: Option<u64>,
    /// Leaf subject alternative names.
    pub leaf_san: Vec<String>,
    /// Leaf expiry.
    pub leaf_not_after: DateTime<Utc>,
    /// Whole days until the leaf expires.
    pub leaf_days_remaining: i64,
}

/// Loads the five artifacts of `scope` and checks that they form a working
/// deployment: the root is a valid self-signed CA owned by the stored CA key,
/// the leaf chains to the root and belongs to the stored leaf key, and the
/// stored request carries the leaf key.
///
/// # Errors
///
/// Returns the first failing check; a missing artifact is reported as
/// [`Error::Io`].
pub fn verify_scope(workspace: &Workspace, scope: &Scope) -> Result<VerificationReport> {
    let ca_key = KeyPair::from_pem(&workspace.read(scope, Artifact::CaKey)?)?;
    let ca_cert = Certificate::from_pem(&workspace.read(scope, Artifact::CaCert)?)?;
    let leaf_key = KeyPair::from_pem(&workspace.read(scope, Artifact::LeafKey)?)?;
    let request = SigningRequest::from_pem(&workspace.read(scope, Artifact::LeafCsr)?)?;
    let leaf = Certificate::from_pem(&workspace.read(scope, Artifact::LeafCert)?)?;

    validation::validate_self_signed(&ca_cert)?;
    validation::validate_key_pair(&ca_key, &ca_cert)?;
    validation::validate_certificate(&leaf, &ca_cert)?;
    validation::validate_key_pair(&leaf_key, &leaf)?;

    request.verify_possession()?;
    if request.public_key() != leaf_key.public_key_raw() {
        return Err(Error::Validation(format!(
            "{} was not made with {}",
            Artifact::LeafCsr,
            Artifact::LeafKey
        )));
    }

    let leaf_days_remaining = validation::remaining_validity(&leaf)
        .map(|d| d.num_days())
        .unwrap_or_default();

    info!(%scope, "artifacts verified");

    Ok(VerificationReport {
        scope: scope.clone(),
        ca_subject: ca_cert.subject().to_string(),
        ca_not_after: ca_cert.not_after(),
        leaf_subject: leaf.subject().to_string(),
        leaf_serial: leaf.serial_u64(),
        leaf_san: leaf.san().iter().map(ToString::to_string).collect(),
        leaf_not_after: leaf.not_after(),
        leaf_days_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuance::{IssuanceOrchestrator, IssueOptions};
    use crate::profile::{CertificateProfile, ProfileSet};
    use crate::types::{DistinguishedName, KeyAlgorithm};
    use tempfile::TempDir;

    fn profiles(_: &Scope) -> Result<ProfileSet> {
        Ok(ProfileSet {
            ca: CertificateProfile::ca("ca", DistinguishedName::new("Verify CA"))
                .key_algorithm(KeyAlgorithm::EcdsaP256)
                .build()?,
            leaf: CertificateProfile::leaf("leaf", DistinguishedName::new("injector.svc"))
                .key_algorithm(KeyAlgorithm::EcdsaP256)
                .dns("injector.svc")
                .build()?,
        })
    }

    fn issued() -> (TempDir, Workspace, Scope) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        IssuanceOrchestrator::new(ws.clone(), profiles)
            .run("eu-west-1", "blue", IssueOptions::default())
            .unwrap();
        let scope = Scope::new("eu-west-1", "blue").unwrap();
        (dir, ws, scope)
    }

    #[test]
    fn verifies_fresh_scope() {
        let (_dir, ws, scope) = issued();
        let report = verify_scope(&ws, &scope).unwrap();
        assert_eq!(report.ca_subject, "CN=Verify CA");
        assert_eq!(report.leaf_serial, Some(2));
        assert_eq!(report.leaf_san, vec!["DNS:injector.svc".to_string()]);
        assert!(report.leaf_days_remaining >= 364);
    }

    #[test]
    fn detects_swapped_leaf_key() {
        let (_dir, ws, scope) = issued();
        let ca_key = ws.read(&scope, Artifact::CaKey).unwrap();
        std::fs::write(ws.path(&scope, Artifact::LeafKey), ca_key).unwrap();
        assert!(matches!(
            verify_scope(&ws, &scope),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let (_dir, ws, scope) = issued();
        std::fs::remove_file(ws.path(&scope, Artifact::LeafCsr)).unwrap();
        assert!(matches!(verify_scope(&ws, &scope), Err(Error::Io { .. })));
    }
}

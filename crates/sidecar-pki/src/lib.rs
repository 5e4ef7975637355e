//! Certificate issuance for the Kubernetes sidecar injector webhook.
//!
//! This crate bootstraps a self-signed certificate authority per
//! availability zone and cluster, and issues the injector's serving
//! certificate from it, entirely in-process.
//!
//! # Overview
//!
//! The `sidecar-pki` crate provides:
//! - Key generation (RSA via the `rsa` crate, ECDSA via `rcgen`)
//! - PKCS#10 request construction and proof-of-possession checks
//! - A CA that lets the profile, not the request, decide what a leaf may carry
//! - A scope-qualified on-disk workspace that refuses silent overwrites
//! - The end-to-end issuance pipeline and offline verification
//!
//! # Example
//!
//! ```
//! use sidecar_pki::{
//!     CertAuthority, CertificateProfile, CsrBuilder, DistinguishedName, KeyAlgorithm,
//!     KeyGenerator, validate_certificate,
//! };
//!
//! let ca_profile = CertificateProfile::ca("ca", DistinguishedName::new("Injector CA"))
//!     .key_algorithm(KeyAlgorithm::EcdsaP256)
//!     .build()
//!     .unwrap();
//! let leaf_profile = CertificateProfile::leaf(
//!     "injector",
//!     DistinguishedName::new("k8s-sidecar-injector.kube-system.svc"),
//! )
//! .key_algorithm(KeyAlgorithm::EcdsaP256)
//! .server_auth()
//! .dns("k8s-sidecar-injector.kube-system.svc")
//! .build()
//! .unwrap();
//!
//! let mut ca = CertAuthority::new();
//! ca.bootstrap(&ca_profile).unwrap();
//!
//! let key = KeyGenerator::generate(leaf_profile.key_algorithm()).unwrap();
//! let request = CsrBuilder::build(&key, &leaf_profile).unwrap();
//! let leaf = ca.sign(&request, &leaf_profile).unwrap();
//!
//! validate_certificate(&leaf, ca.root_certificate().unwrap()).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`keygen`] - Key pair generation
//! - [`csr`] - Signing request construction and parsing
//! - [`ca`] - Certificate Authority
//! - [`profile`] - Certificate profiles
//! - [`workspace`] - Scope directories and artifact files
//! - [`issuance`] - The issuance pipeline
//! - [`verify`] - Offline verification of a scope
//! - [`validation`] - Certificate validation utilities
//! - [`types`] - Core types (Certificate, `PrivateKey`, etc.)
//! - [`error`] - Error types

#![forbid(unsafe_code)]

pub mod ca;
pub mod csr;
pub mod error;
pub mod issuance;
pub mod keygen;
pub mod pem;
pub mod profile;
pub mod types;
pub mod validation;
pub mod verify;
pub mod workspace;

// Re-export commonly used types at crate root
pub use ca::{CertAuthority, ROOT_SERIAL};
pub use csr::{CsrBuilder, SigningRequest};
pub use error::{Error, Result};
pub use issuance::{
    CaOutcome, IssuanceError, IssuanceOrchestrator, IssuanceReport, IssueOptions, Step,
};
pub use keygen::{KeyGenerator, KeyPair, MAX_RSA_BITS, MIN_RSA_BITS};
pub use profile::{
    CertificateProfile, CertificateProfileBuilder, MAX_VALIDITY_DAYS, ProfileSet, ProfileSource,
};
pub use types::{
    Certificate, DistinguishedName, ExtendedKeyUsage, KeyAlgorithm, KeyUsage, PrivateKey,
    SubjectAltName,
};
pub use validation::{
    is_expired, is_not_yet_valid, is_valid_now, remaining_validity, validate_certificate,
    validate_chain, validate_key_pair, validate_self_signed,
};
pub use verify::{VerificationReport, verify_scope};
pub use workspace::{Artifact, Scope, Workspace};

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn rsa_workflow_matches_injector_defaults() {
        let ca_profile = CertificateProfile::ca("ca", DistinguishedName::new("Injector CA"))
            .key_algorithm(KeyAlgorithm::rsa(2048))
            .validity_days(999_999)
            .build()
            .unwrap();
        let leaf_profile = CertificateProfile::leaf(
            "injector",
            DistinguishedName::new("k8s-sidecar-injector.kube-system.svc"),
        )
        .key_algorithm(KeyAlgorithm::rsa(2048))
        .validity_days(999_999)
        .server_auth()
        .dns("k8s-sidecar-injector")
        .dns("k8s-sidecar-injector.kube-system")
        .dns("k8s-sidecar-injector.kube-system.svc")
        .ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .build()
        .unwrap();

        let mut ca = CertAuthority::new();
        let root = ca.bootstrap(&ca_profile).unwrap().clone();
        assert!(root.not_after().format("%Y").to_string().parse::<i32>().unwrap() > 4000);

        let key = KeyGenerator::generate(leaf_profile.key_algorithm()).unwrap();
        let request = CsrBuilder::build(&key, &leaf_profile).unwrap();
        assert_eq!(request.key_algorithm(), KeyAlgorithm::rsa(2048));

        let leaf = ca.sign(&request, &leaf_profile).unwrap();
        assert_eq!(leaf.san().len(), 4);
        assert_eq!(leaf.extended_key_usages(), &[ExtendedKeyUsage::ServerAuth]);
        validate_chain(&[leaf.clone(), root]).unwrap();
        validate_key_pair(&key, &leaf).unwrap();
    }
}

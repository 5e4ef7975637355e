//! PKCS#10 certificate signing requests.

use rcgen::{CertificateParams, CustomExtension};
use tracing::debug;
use x509_parser::extensions::ParsedExtension;
use x509_parser::oid_registry::asn1_rs::oid;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::error::{Error, Result};
use crate::keygen::KeyPair;
use crate::pem;
use crate::profile::CertificateProfile;
use crate::types::{
    DistinguishedName, ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SubjectAltName,
    extended_key_usages_from_x509, key_usages_from_x509, sans_from_general_names,
};

const OID_BASIC_CONSTRAINTS: &[u64] = &[2, 5, 29, 19];

/// A parsed, not yet verified, certificate signing request.
///
/// Parsing never checks the embedded signature; call
/// [`SigningRequest::verify_possession`] before trusting the contents.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    der: Vec<u8>,
    subject: DistinguishedName,
    requested_san: Vec<SubjectAltName>,
    requests_ca: bool,
    key_usages: Vec<KeyUsage>,
    extended_key_usages: Vec<ExtendedKeyUsage>,
    key_algorithm: KeyAlgorithm,
    public_key: Vec<u8>,
}

impl SigningRequest {
    /// Parses a DER-encoded request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the request is malformed or carries an
    /// unsupported public key type.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        use x509_parser::prelude::*;

        let (_, csr) = X509CertificationRequest::from_der(der)
            .map_err(|e| Error::Parse(format!("failed to parse signing request: {e}")))?;
        let info = &csr.certification_request_info;

        let mut requested_san = Vec::new();
        let mut requests_ca = false;
        let mut key_usages = Vec::new();
        let mut extended_key_usages = Vec::new();

        if let Some(extensions) = csr.requested_extensions() {
            for ext in extensions {
                match ext {
                    ParsedExtension::SubjectAlternativeName(san) => {
                        requested_san.extend(sans_from_general_names(&san.general_names));
                    }
                    ParsedExtension::BasicConstraints(bc) => requests_ca = bc.ca,
                    ParsedExtension::KeyUsage(ku) => key_usages = key_usages_from_x509(ku),
                    ParsedExtension::ExtendedKeyUsage(eku) => {
                        extended_key_usages = extended_key_usages_from_x509(eku);
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            der: der.to_vec(),
            subject: DistinguishedName::from_x509(&info.subject)?,
            requested_san,
            requests_ca,
            key_usages,
            extended_key_usages,
            key_algorithm: key_algorithm_of(&info.subject_pki)?,
            public_key: info.subject_pki.subject_public_key.data.to_vec(),
        })
    }

    /// Parses a `CERTIFICATE REQUEST` PEM block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the PEM or the request is malformed.
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        Self::from_der(&pem::decode(pem::CERTIFICATE_REQUEST, pem_text)?)
    }

    /// Proof of possession: the request's signature must verify against its
    /// own embedded public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureVerification`] if the signature is invalid.
    pub fn verify_possession(&self) -> Result<()> {
        use x509_parser::prelude::*;

        let (_, csr) = X509CertificationRequest::from_der(&self.der)
            .map_err(|e| Error::Parse(format!("failed to parse signing request: {e}")))?;
        csr.verify_signature().map_err(|e| {
            Error::SignatureVerification(format!(
                "request for '{}' is not signed by its own key: {e}",
                self.subject.common_name
            ))
        })
    }

    /// DER-encoded request.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM-encoded request.
    #[must_use]
    pub fn pem(&self) -> String {
        pem::encode(pem::CERTIFICATE_REQUEST, &self.der)
    }

    /// Requested subject.
    #[must_use]
    pub const fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    /// Requested subject alternative names.
    #[must_use]
    pub fn requested_san(&self) -> &[SubjectAltName] {
        &self.requested_san
    }

    /// Whether the request asks for `basicConstraints CA:TRUE`.
    #[must_use]
    pub const fn requests_ca(&self) -> bool {
        self.requests_ca
    }

    /// Requested `keyUsage` bits.
    #[must_use]
    pub fn key_usages(&self) -> &[KeyUsage] {
        &self.key_usages
    }

    /// Requested extended key usages.
    #[must_use]
    pub fn extended_key_usages(&self) -> &[ExtendedKeyUsage] {
        &self.extended_key_usages
    }

    /// Algorithm of the embedded public key.
    #[must_use]
    pub const fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    /// Raw subject public key bits.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

fn key_algorithm_of(spki: &SubjectPublicKeyInfo<'_>) -> Result<KeyAlgorithm> {
    let rsa_oid = oid!(1.2.840.113549.1.1.1);
    let ec_oid = oid!(1.2.840.10045.2.1);
    let p256_oid = oid!(1.2.840.10045.3.1.7);
    let p384_oid = oid!(1.3.132.0.34);

    let unsupported = || {
        Error::Parse(format!(
            "unsupported public key algorithm {}",
            spki.algorithm.algorithm
        ))
    };

    if spki.algorithm.algorithm == rsa_oid {
        return match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => Ok(KeyAlgorithm::rsa(rsa.key_size() as u32)),
            _ => Err(Error::Parse("malformed RSA public key".into())),
        };
    }

    if spki.algorithm.algorithm == ec_oid {
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| params.as_oid().ok());
        return match curve {
            Some(curve) if curve == p256_oid => Ok(KeyAlgorithm::EcdsaP256),
            Some(curve) if curve == p384_oid => Ok(KeyAlgorithm::EcdsaP384),
            _ => Err(unsupported()),
        };
    }

    Err(unsupported())
}

/// Builds leaf signing requests from a key pair and a profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrBuilder;

impl CsrBuilder {
    /// Builds a signing request for `profile`, signed with `key_pair`.
    ///
    /// The request embeds exactly the profile's subject, SANs, key usages,
    /// extended key usages and `basicConstraints CA:FALSE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileValidation`] if the profile is a CA profile or
    /// incomplete, and [`Error::San`] if a SAN cannot be encoded.
    pub fn build(key_pair: &KeyPair, profile: &CertificateProfile) -> Result<SigningRequest> {
        if profile.is_ca() {
            return Err(Error::ProfileValidation(format!(
                "{}: CA profiles cannot be used for a leaf signing request",
                profile.name()
            )));
        }
        profile.validate()?;

        let mut params = CertificateParams::default();
        params.distinguished_name = profile.subject().to_rcgen();
        params.subject_alt_names = profile
            .subject_alt_names()
            .iter()
            .map(SubjectAltName::to_rcgen)
            .collect::<Result<_>>()?;
        params.key_usages = profile.key_usages().iter().map(|ku| ku.to_rcgen()).collect();
        params.extended_key_usages = profile
            .extended_key_usages()
            .iter()
            .map(|eku| eku.to_rcgen())
            .collect();
        // rcgen refuses `is_ca` in requests, so CA:FALSE goes in by hand.
        params.custom_extensions = vec![basic_constraints(false)];

        let csr = params.serialize_request(key_pair.signing_key()).map_err(|e| {
            Error::ProfileValidation(format!(
                "{}: failed to encode signing request: {e}",
                profile.name()
            ))
        })?;

        debug!(subject = %profile.subject(), "signing request built");
        SigningRequest::from_der(csr.der())
    }
}

/// DER `BasicConstraints`, marked critical.
pub(crate) fn basic_constraints(ca: bool) -> CustomExtension {
    let content = if ca {
        vec![0x30, 0x03, 0x01, 0x01, 0xFF]
    } else {
        vec![0x30, 0x00]
    };
    let mut ext = CustomExtension::from_oid_content(OID_BASIC_CONSTRAINTS, content);
    ext.set_criticality(true);
    ext
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::KeyGenerator;
    use std::net::{IpAddr, Ipv4Addr};

    fn leaf_profile() -> CertificateProfile {
        CertificateProfile::leaf(
            "leaf",
            DistinguishedName::new("k8s-sidecar-injector.kube-system.svc")
                .with_organization("Acme"),
        )
        .key_algorithm(KeyAlgorithm::EcdsaP256)
        .server_auth()
        .dns("k8s-sidecar-injector.kube-system.svc")
        .ip(IpAddr::V4(Ipv4Addr::new(10, 96, 0, 10)))
        .build()
        .unwrap()
    }

    #[test]
    fn request_embeds_profile_exactly() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let profile = leaf_profile();
        let csr = CsrBuilder::build(&key, &profile).unwrap();

        assert_eq!(csr.subject(), profile.subject());
        assert_eq!(csr.requested_san(), profile.subject_alt_names());
        assert_eq!(csr.extended_key_usages(), &[ExtendedKeyUsage::ServerAuth]);
        assert_eq!(
            csr.key_usages(),
            &[KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]
        );
        assert!(!csr.requests_ca());
        assert_eq!(csr.key_algorithm(), KeyAlgorithm::EcdsaP256);
    }

    #[test]
    fn request_carries_public_key_of_key_pair() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let csr = CsrBuilder::build(&key, &leaf_profile()).unwrap();
        assert_eq!(csr.public_key(), key.public_key_raw());
    }

    #[test]
    fn request_proves_possession() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP384).unwrap();
        let csr = CsrBuilder::build(&key, &leaf_profile()).unwrap();
        csr.verify_possession().unwrap();
    }

    #[test]
    fn tampered_request_fails_possession() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let csr = CsrBuilder::build(&key, &leaf_profile()).unwrap();

        let mut der = csr.der().to_vec();
        let cn = b"k8s-sidecar-injector";
        let pos = der.windows(cn.len()).position(|w| w == cn).unwrap();
        der[pos] = b'x';

        let tampered = SigningRequest::from_der(&der).unwrap();
        assert!(matches!(
            tampered.verify_possession(),
            Err(Error::SignatureVerification(_))
        ));
    }

    #[test]
    fn pem_round_trip_preserves_request() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let csr = CsrBuilder::build(&key, &leaf_profile()).unwrap();
        let pem = csr.pem();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        let parsed = SigningRequest::from_pem(&pem).unwrap();
        assert_eq!(parsed.der(), csr.der());
    }

    #[test]
    fn rejects_ca_profile() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let profile = CertificateProfile::ca("ca", DistinguishedName::new("Root"))
            .key_algorithm(KeyAlgorithm::EcdsaP256)
            .build()
            .unwrap();
        assert!(matches!(
            CsrBuilder::build(&key, &profile),
            Err(Error::ProfileValidation(_))
        ));
    }

    #[test]
    fn rejects_garbage_der() {
        assert!(matches!(
            SigningRequest::from_der(&[0x30, 0x01, 0x00]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn request_carries_every_extended_usage() {
        let key = KeyGenerator::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let profile = CertificateProfile::leaf("leaf", DistinguishedName::new("mtls.example"))
            .key_algorithm(KeyAlgorithm::EcdsaP256)
            .key_usages([KeyUsage::DigitalSignature])
            .server_auth()
            .client_auth()
            .build()
            .unwrap();
        let csr = CsrBuilder::build(&key, &profile).unwrap();

        assert_eq!(csr.key_usages(), &[KeyUsage::DigitalSignature]);
        assert_eq!(
            csr.extended_key_usages(),
            &[ExtendedKeyUsage::ServerAuth, ExtendedKeyUsage::ClientAuth]
        );
        assert!(!csr.requests_ca());
    }

    #[test]
    fn basic_constraints_encoding() {
        assert_eq!(basic_constraints(false).content(), &[0x30, 0x00]);
        assert_eq!(
            basic_constraints(true).content(),
            &[0x30, 0x03, 0x01, 0x01, 0xFF]
        );
    }
}

//! Certificate profiles: the declarative description of what a CA or leaf
//! certificate may contain.

use std::net::IpAddr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{DistinguishedName, ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SubjectAltName};
use crate::workspace::Scope;

/// Longest accepted validity. Keeps `not_after` inside the X.509
/// `GeneralizedTime` range (year 9999) for centuries to come.
pub const MAX_VALIDITY_DAYS: u32 = 2_900_000;

/// Immutable certificate profile.
///
/// For a leaf profile the subject alternative names are the *permitted* set:
/// the authority drops any requested name that is not listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateProfile {
    name: String,
    subject: DistinguishedName,
    validity_days: u32,
    key_algorithm: KeyAlgorithm,
    key_usages: Vec<KeyUsage>,
    extended_key_usages: Vec<ExtendedKeyUsage>,
    subject_alt_names: Vec<SubjectAltName>,
    is_ca: bool,
}

impl CertificateProfile {
    /// Starts a CA profile (`basicConstraints CA:TRUE`).
    #[must_use]
    pub fn ca(name: impl Into<String>, subject: DistinguishedName) -> CertificateProfileBuilder {
        CertificateProfileBuilder {
            name: name.into(),
            subject,
            validity_days: 3650,
            key_algorithm: KeyAlgorithm::rsa(4096),
            key_usages: vec![
                KeyUsage::KeyCertSign,
                KeyUsage::CrlSign,
                KeyUsage::DigitalSignature,
            ],
            extended_key_usages: Vec::new(),
            subject_alt_names: Vec::new(),
            is_ca: true,
        }
    }

    /// Starts a leaf profile (`basicConstraints CA:FALSE`).
    #[must_use]
    pub fn leaf(name: impl Into<String>, subject: DistinguishedName) -> CertificateProfileBuilder {
        CertificateProfileBuilder {
            name: name.into(),
            subject,
            validity_days: 365,
            key_algorithm: KeyAlgorithm::rsa(2048),
            key_usages: vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment],
            extended_key_usages: Vec::new(),
            subject_alt_names: Vec::new(),
            is_ca: false,
        }
    }

    /// Profile name, used in logs and reports.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subject name.
    #[must_use]
    pub const fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    /// Validity period in days.
    #[must_use]
    pub const fn validity_days(&self) -> u32 {
        self.validity_days
    }

    /// Algorithm of the key generated for this profile.
    #[must_use]
    pub const fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    /// `keyUsage` bits.
    #[must_use]
    pub fn key_usages(&self) -> &[KeyUsage] {
        &self.key_usages
    }

    /// Extended key usages.
    #[must_use]
    pub fn extended_key_usages(&self) -> &[ExtendedKeyUsage] {
        &self.extended_key_usages
    }

    /// Permitted subject alternative names.
    #[must_use]
    pub fn subject_alt_names(&self) -> &[SubjectAltName] {
        &self.subject_alt_names
    }

    /// Whether this is a CA profile.
    #[must_use]
    pub const fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// True when `san` is in the permitted set.
    #[must_use]
    pub fn permits(&self, san: &SubjectAltName) -> bool {
        self.subject_alt_names.contains(san)
    }

    /// Checks the profile is complete and consistent with its role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileValidation`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::ProfileValidation(format!("{}: {msg}", self.name)));

        if self.subject.common_name.trim().is_empty() {
            return invalid("subject common name cannot be empty".into());
        }
        for (field, value) in [
            ("organization", &self.subject.organization),
            ("organizational unit", &self.subject.organizational_unit),
            ("country", &self.subject.country),
            ("state", &self.subject.state),
            ("locality", &self.subject.locality),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return invalid(format!("subject {field} cannot be empty when set"));
            }
        }
        if self
            .subject
            .country
            .as_deref()
            .is_some_and(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
        {
            return invalid("subject country must be a two-letter code".into());
        }
        if self.validity_days == 0 {
            return invalid("validity_days must be greater than 0".into());
        }
        if self.validity_days > MAX_VALIDITY_DAYS {
            return invalid(format!(
                "validity_days must be at most {MAX_VALIDITY_DAYS}, got {}",
                self.validity_days
            ));
        }
        if self.is_ca && !self.key_usages.contains(&KeyUsage::KeyCertSign) {
            return invalid("CA profile must include keyCertSign".into());
        }
        if !self.is_ca && self.key_usages.contains(&KeyUsage::KeyCertSign) {
            return invalid("leaf profile must not include keyCertSign".into());
        }
        Ok(())
    }
}

/// Builder for [`CertificateProfile`].
#[derive(Debug)]
pub struct CertificateProfileBuilder {
    name: String,
    subject: DistinguishedName,
    validity_days: u32,
    key_algorithm: KeyAlgorithm,
    key_usages: Vec<KeyUsage>,
    extended_key_usages: Vec<ExtendedKeyUsage>,
    subject_alt_names: Vec<SubjectAltName>,
    is_ca: bool,
}

impl CertificateProfileBuilder {
    /// Sets the validity period in days.
    #[must_use]
    pub const fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Sets the key algorithm.
    #[must_use]
    pub const fn key_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.key_algorithm = algorithm;
        self
    }

    /// Replaces the `keyUsage` bits.
    #[must_use]
    pub fn key_usages(mut self, usages: impl IntoIterator<Item = KeyUsage>) -> Self {
        self.key_usages = usages.into_iter().collect();
        self
    }

    /// Adds an extended key usage.
    #[must_use]
    pub fn extended_key_usage(mut self, usage: ExtendedKeyUsage) -> Self {
        if !self.extended_key_usages.contains(&usage) {
            self.extended_key_usages.push(usage);
        }
        self
    }

    /// Adds server authentication extended key usage.
    #[must_use]
    pub fn server_auth(self) -> Self {
        self.extended_key_usage(ExtendedKeyUsage::ServerAuth)
    }

    /// Adds client authentication extended key usage.
    #[must_use]
    pub fn client_auth(self) -> Self {
        self.extended_key_usage(ExtendedKeyUsage::ClientAuth)
    }

    /// Permits a subject alternative name.
    #[must_use]
    pub fn san(mut self, san: SubjectAltName) -> Self {
        if !self.subject_alt_names.contains(&san) {
            self.subject_alt_names.push(san);
        }
        self
    }

    /// Permits a DNS subject alternative name.
    #[must_use]
    pub fn dns(self, dns: impl Into<String>) -> Self {
        self.san(SubjectAltName::Dns(dns.into()))
    }

    /// Permits an IP subject alternative name.
    #[must_use]
    pub fn ip(self, ip: IpAddr) -> Self {
        self.san(SubjectAltName::Ip(ip))
    }

    /// Builds and validates the profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileValidation`] if the profile is invalid.
    pub fn build(self) -> Result<CertificateProfile> {
        let profile = CertificateProfile {
            name: self.name,
            subject: self.subject,
            validity_days: self.validity_days,
            key_algorithm: self.key_algorithm,
            key_usages: self.key_usages,
            extended_key_usages: self.extended_key_usages,
            subject_alt_names: self.subject_alt_names,
            is_ca: self.is_ca,
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// The CA and leaf profiles that apply to one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSet {
    /// Root certificate profile.
    pub ca: CertificateProfile,
    /// Leaf certificate profile.
    pub leaf: CertificateProfile,
}

/// Supplies the profiles for a scope.
pub trait ProfileSource {
    /// Returns the profiles to use when issuing for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileValidation`] if the profiles cannot be produced.
    fn profiles_for(&self, scope: &Scope) -> Result<ProfileSet>;
}

impl<F> ProfileSource for F
where
    F: Fn(&Scope) -> Result<ProfileSet>,
{
    fn profiles_for(&self, scope: &Scope) -> Result<ProfileSet> {
        self(scope)
    }
}

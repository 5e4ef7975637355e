//! Profile configuration.
//!
//! The CA and leaf profiles come from an optional TOML file with `[ca]` and
//! `[leaf]` tables. Anything left out falls back to the injector defaults:
//! an RSA-4096 root and an RSA-2048 `serverAuth` leaf for the
//! `k8s-sidecar-injector` service in `kube-system`, both valid for
//! 999 999 days.
//!
//! String values may use `{az}` and `{cluster}`, which are replaced with the
//! normalized scope when profiles are produced.
//!
//! ```toml
//! [ca]
//! validity_days = 3650
//! key_algorithm = "ecdsa-p384"
//!
//! [ca.subject]
//! common_name = "{az}-{cluster} injector CA"
//! organization = "Example Corp"
//!
//! [leaf]
//! dns_names = ["injector.{az}.example.com"]
//! ```

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sidecar_pki::{
    CertificateProfile, DistinguishedName, ExtendedKeyUsage, KeyAlgorithm, MAX_RSA_BITS,
    MAX_VALIDITY_DAYS, MIN_RSA_BITS, ProfileSet, ProfileSource, Scope,
};

use crate::error::CliError;

/// Validity used by the injector for both certificates.
pub const DEFAULT_VALIDITY_DAYS: u32 = 999_999;

/// Kubernetes service the leaf certificate is served for.
pub const INJECTOR_SERVICE: &str = "k8s-sidecar-injector";

/// Namespace the injector service runs in.
pub const INJECTOR_NAMESPACE: &str = "kube-system";

/// Root certificate settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CaConfig {
    /// Subject of the root.
    pub subject: DistinguishedName,
    /// Root validity in days.
    pub validity_days: u32,
    /// Root key algorithm.
    pub key_algorithm: KeyAlgorithm,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            subject: DistinguishedName::new("{az}-{cluster} sidecar injector CA"),
            validity_days: DEFAULT_VALIDITY_DAYS,
            key_algorithm: KeyAlgorithm::rsa(4096),
        }
    }
}

/// Leaf certificate settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LeafConfig {
    /// Subject of the leaf.
    pub subject: DistinguishedName,
    /// Leaf validity in days.
    pub validity_days: u32,
    /// Leaf key algorithm.
    pub key_algorithm: KeyAlgorithm,
    /// Extended key usages.
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    /// DNS subject alternative names.
    pub dns_names: Vec<String>,
    /// IP subject alternative names.
    pub ip_addresses: Vec<IpAddr>,
}

impl Default for LeafConfig {
    fn default() -> Self {
        let service = format!("{INJECTOR_SERVICE}.{INJECTOR_NAMESPACE}.svc");
        Self {
            subject: DistinguishedName::new(service.as_str()),
            validity_days: DEFAULT_VALIDITY_DAYS,
            key_algorithm: KeyAlgorithm::rsa(2048),
            extended_key_usages: vec![ExtendedKeyUsage::ServerAuth],
            dns_names: vec![
                INJECTOR_SERVICE.to_string(),
                format!("{INJECTOR_SERVICE}.{INJECTOR_NAMESPACE}"),
                service.clone(),
                format!("{service}.cluster.local"),
            ],
            ip_addresses: Vec::new(),
        }
    }
}

/// CA and leaf profile configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Root certificate settings.
    pub ca: CaConfig,
    /// Leaf certificate settings.
    pub leaf: LeafConfig,
}

impl ProfileConfig {
    /// Loads `path`, or the built-in defaults when no file is given.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self =
            toml::from_str(content).map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), CliError> {
        check_common("ca", &self.ca.subject, self.ca.validity_days, self.ca.key_algorithm)?;
        check_common(
            "leaf",
            &self.leaf.subject,
            self.leaf.validity_days,
            self.leaf.key_algorithm,
        )?;

        if self.leaf.dns_names.iter().any(|name| name.trim().is_empty()) {
            return Err(CliError::Config(
                "leaf.dns_names must not contain empty names".to_string(),
            ));
        }

        Ok(())
    }

    /// Builds the profiles for `scope`, expanding placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`sidecar_pki::Error::ProfileValidation`] if an expanded
    /// profile is invalid.
    pub fn profiles(&self, scope: &Scope) -> sidecar_pki::Result<ProfileSet> {
        let ca = CertificateProfile::ca("ca", expand_subject(&self.ca.subject, scope))
            .validity_days(self.ca.validity_days)
            .key_algorithm(self.ca.key_algorithm)
            .build()?;

        let mut leaf = CertificateProfile::leaf(
            INJECTOR_SERVICE,
            expand_subject(&self.leaf.subject, scope),
        )
        .validity_days(self.leaf.validity_days)
        .key_algorithm(self.leaf.key_algorithm);
        for usage in &self.leaf.extended_key_usages {
            leaf = leaf.extended_key_usage(*usage);
        }
        for name in &self.leaf.dns_names {
            leaf = leaf.dns(expand(name, scope));
        }
        for ip in &self.leaf.ip_addresses {
            leaf = leaf.ip(*ip);
        }

        Ok(ProfileSet {
            ca,
            leaf: leaf.build()?,
        })
    }
}

impl ProfileSource for ProfileConfig {
    fn profiles_for(&self, scope: &Scope) -> sidecar_pki::Result<ProfileSet> {
        self.profiles(scope)
    }
}

fn check_common(
    table: &str,
    subject: &DistinguishedName,
    validity_days: u32,
    key_algorithm: KeyAlgorithm,
) -> Result<(), CliError> {
    if subject.common_name.trim().is_empty() {
        return Err(CliError::Config(format!(
            "{table}.subject.common_name cannot be empty"
        )));
    }

    if validity_days == 0 {
        return Err(CliError::Config(format!(
            "{table}.validity_days must be greater than 0"
        )));
    }
    if validity_days > MAX_VALIDITY_DAYS {
        return Err(CliError::Config(format!(
            "{table}.validity_days must be at most {MAX_VALIDITY_DAYS}, got {validity_days}"
        )));
    }

    if let KeyAlgorithm::Rsa { bits } = key_algorithm {
        if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
            return Err(CliError::Config(format!(
                "{table}.key_algorithm: RSA keys must be \
                 {MIN_RSA_BITS}..={MAX_RSA_BITS} bits, got {bits}"
            )));
        }
    }

    Ok(())
}

/// Replaces `{az}` and `{cluster}` with the scope's normalized parts.
fn expand(template: &str, scope: &Scope) -> String {
    template
        .replace("{az}", scope.az())
        .replace("{cluster}", scope.cluster())
}

fn expand_subject(subject: &DistinguishedName, scope: &Scope) -> DistinguishedName {
    let field = |value: &Option<String>| value.as_deref().map(|v| expand(v, scope));
    DistinguishedName {
        common_name: expand(&subject.common_name, scope),
        organization: field(&subject.organization),
        organizational_unit: field(&subject.organizational_unit),
        country: field(&subject.country),
        state: field(&subject.state),
        locality: field(&subject.locality),
    }
}

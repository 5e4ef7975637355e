//! Certificate Authority implementation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, IsCa, KeyUsagePurpose, PublicKeyData, SerialNumber,
    SignatureAlgorithm,
};
use tracing::{debug, info, warn};

use crate::csr::SigningRequest;
use crate::error::{Error, Result};
use crate::keygen::{KeyGenerator, KeyPair};
use crate::profile::CertificateProfile;
use crate::types::{Certificate, DistinguishedName, SubjectAltName};
use crate::validation;

/// Serial number of every root certificate this authority creates.
pub const ROOT_SERIAL: u64 = 1;

/// Root key, root certificate and serial counter of a self-signed CA.
///
/// The authority is either uninitialized or ready; signing requires a ready
/// authority, obtained through [`CertAuthority::bootstrap`] or
/// [`CertAuthority::load`].
#[derive(Default)]
pub struct CertAuthority {
    state: Option<Box<Ready>>,
}

struct Ready {
    root_cert: Certificate,
    root_key: KeyPair,
    issuer: rcgen::Certificate,
    next_serial: u64,
}

impl CertAuthority {
    /// Creates an uninitialized authority.
    #[must_use]
    pub const fn new() -> Self {
        Self { state: None }
    }

    /// Generates a root key pair and self-signed root certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bootstrap`] if the authority is already initialized or
    /// `profile` is not a CA profile.
    pub fn bootstrap(&mut self, profile: &CertificateProfile) -> Result<&Certificate> {
        if let Some(ready) = &self.state {
            return Err(Error::Bootstrap(format!(
                "authority '{}' is already initialized; re-bootstrap must be requested explicitly",
                ready.root_cert.subject().common_name
            )));
        }
        let ready = self.state.insert(Box::new(create_root(profile)?));
        Ok(&ready.root_cert)
    }

    /// Replaces any existing root with a freshly generated one.
    ///
    /// Certificates issued by the previous root no longer chain to this
    /// authority.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bootstrap`] if root creation fails; the previous root
    /// is kept in that case.
    pub fn rebootstrap(&mut self, profile: &CertificateProfile) -> Result<&Certificate> {
        let ready = create_root(profile)?;
        if let Some(previous) = &self.state {
            warn!(
                previous = %previous.root_cert.subject(),
                "replacing existing certificate authority root"
            );
        }
        let ready = self.state.insert(Box::new(ready));
        Ok(&ready.root_cert)
    }

    /// Restores an authority from a persisted root key and certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAuthority`] if the certificate is not a
    /// self-signed CA certificate or the key does not belong to it.
    pub fn load(root_key: KeyPair, root_cert: Certificate) -> Result<Self> {
        if !root_cert.is_self_issued() {
            return Err(Error::InvalidAuthority(format!(
                "certificate '{}' is issued by '{}', not self-signed",
                root_cert.subject(),
                root_cert.issuer()
            )));
        }
        validation::verify_signature(&root_cert, &root_cert).map_err(|e| {
            Error::InvalidAuthority(format!(
                "certificate '{}' has an invalid self-signature: {e}",
                root_cert.subject()
            ))
        })?;
        if !root_cert.is_ca() {
            return Err(Error::InvalidAuthority(format!(
                "certificate '{}' is not a CA certificate",
                root_cert.subject()
            )));
        }
        if !root_key.matches_certificate(&root_cert) {
            return Err(Error::InvalidAuthority(format!(
                "private key does not match certificate '{}'",
                root_cert.subject()
            )));
        }

        let issuer = create_issuer_cert(root_cert.subject(), &root_key)
            .map_err(|e| Error::InvalidAuthority(e.to_string()))?;
        let next_serial = root_cert
            .serial_u64()
            .unwrap_or(ROOT_SERIAL)
            .saturating_add(1)
            .max(ROOT_SERIAL + 1);

        info!(subject = %root_cert.subject(), "loaded existing certificate authority");

        Ok(Self {
            state: Some(Box::new(Ready {
                root_cert,
                root_key,
                issuer,
                next_serial,
            })),
        })
    }

    /// Whether the authority holds a root.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Returns the root certificate, if initialized.
    #[must_use]
    pub fn root_certificate(&self) -> Option<&Certificate> {
        self.state.as_deref().map(|ready| &ready.root_cert)
    }

    /// Returns the root key pair, if initialized.
    #[must_use]
    pub fn root_key(&self) -> Option<&KeyPair> {
        self.state.as_deref().map(|ready| &ready.root_key)
    }

    /// Serial number the next issued certificate will carry.
    #[must_use]
    pub fn next_serial(&self) -> Option<u64> {
        self.state.as_deref().map(|ready| ready.next_serial)
    }

    /// Advances the serial counter past a certificate this authority issued
    /// earlier, so a reloaded authority never reuses a serial.
    ///
    /// Certificates not signed by this root are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the authority is uninitialized.
    pub fn observe_issued(&mut self, cert: &Certificate) -> Result<()> {
        let ready = self.ready_mut()?;

        if validation::verify_signature(cert, &ready.root_cert).is_err() {
            debug!(subject = %cert.subject(), "ignoring certificate from another issuer");
            return Ok(());
        }
        if let Some(serial) = cert.serial_u64() {
            if serial >= ready.next_serial {
                ready.next_serial = serial.saturating_add(1);
                debug!(next_serial = ready.next_serial, "serial counter advanced");
            }
        }
        Ok(())
    }

    /// Signs a leaf certificate for `request` under `profile`.
    ///
    /// The profile is authoritative: the issued certificate's subject, key
    /// usages, extended key usages and basic constraints come from the
    /// profile, and requested SANs outside the profile's permitted set are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the authority is uninitialized, the
    /// profile is a CA profile, the request fails proof of possession, or the
    /// requested subject differs from the profile's.
    pub fn sign(
        &mut self,
        request: &SigningRequest,
        profile: &CertificateProfile,
    ) -> Result<Certificate> {
        let ready = self.ready_mut()?;

        if profile.is_ca() {
            return Err(Error::Signing(format!(
                "profile '{}' is a CA profile; only leaf certificates are issued",
                profile.name()
            )));
        }
        profile.validate()?;
        request
            .verify_possession()
            .map_err(|e| Error::Signing(format!("proof of possession failed: {e}")))?;

        if request.subject().common_name != profile.subject().common_name {
            return Err(Error::Signing(format!(
                "requested common name '{}' does not match profile '{}' ('{}')",
                request.subject().common_name,
                profile.name(),
                profile.subject().common_name
            )));
        }
        if request.requests_ca() {
            warn!(subject = %request.subject(), "request asks for CA capability; ignoring");
        }

        let (permitted, dropped): (Vec<&SubjectAltName>, Vec<&SubjectAltName>) = request
            .requested_san()
            .iter()
            .partition(|san| profile.permits(san));
        for san in dropped {
            warn!(%san, "dropping subject alternative name not permitted by profile");
        }

        let serial = ready.next_serial;
        info!(subject = %profile.subject(), serial, "signing leaf certificate");

        let mut params = CertificateParams::default();
        params.distinguished_name = profile.subject().to_rcgen();
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = profile.key_usages().iter().map(|ku| ku.to_rcgen()).collect();
        params.extended_key_usages = profile
            .extended_key_usages()
            .iter()
            .map(|eku| eku.to_rcgen())
            .collect();
        params.subject_alt_names = permitted
            .into_iter()
            .map(SubjectAltName::to_rcgen)
            .collect::<Result<_>>()?;
        set_validity(&mut params, profile.validity_days())?;
        params.serial_number = Some(SerialNumber::from(serial));

        let public_key = CsrPublicKey {
            raw: request.public_key().to_vec(),
            algorithm: request.key_algorithm().signature_algorithm(),
        };

        let cert = params
            .signed_by(&public_key, &ready.issuer, ready.root_key.signing_key())
            .map_err(|e| Error::Signing(format!("failed to sign certificate: {e}")))?;
        let certificate = Certificate::from_der(cert.der())?;

        ready.next_serial = serial.saturating_add(1);
        debug!(serial, not_after = %certificate.not_after(), "leaf certificate issued");

        Ok(certificate)
    }

    fn ready_mut(&mut self) -> Result<&mut Ready> {
        self.state
            .as_deref_mut()
            .ok_or_else(|| Error::Signing("certificate authority is not initialized".into()))
    }
}

impl fmt::Debug for CertAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.as_deref() {
            None => f.debug_struct("CertAuthority").field("state", &"uninitialized").finish(),
            Some(ready) => f
                .debug_struct("CertAuthority")
                .field("subject", &ready.root_cert.subject())
                .field("root_key", &"[REDACTED]")
                .field("next_serial", &ready.next_serial)
                .finish_non_exhaustive(),
        }
    }
}

/// Public key taken from a signing request.
struct CsrPublicKey {
    raw: Vec<u8>,
    algorithm: &'static SignatureAlgorithm,
}

impl PublicKeyData for CsrPublicKey {
    fn der_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        self.algorithm
    }
}

fn create_root(profile: &CertificateProfile) -> Result<Ready> {
    if !profile.is_ca() {
        return Err(Error::Bootstrap(format!(
            "profile '{}' is not a CA profile",
            profile.name()
        )));
    }
    profile.validate()?;

    info!(subject = %profile.subject(), algorithm = %profile.key_algorithm(), "generating CA key");
    let root_key = KeyGenerator::generate(profile.key_algorithm())?;

    let mut params = CertificateParams::default();
    params.distinguished_name = profile.subject().to_rcgen();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = profile.key_usages().iter().map(|ku| ku.to_rcgen()).collect();
    params.extended_key_usages = profile
        .extended_key_usages()
        .iter()
        .map(|eku| eku.to_rcgen())
        .collect();
    params.serial_number = Some(SerialNumber::from(ROOT_SERIAL));
    set_validity(&mut params, profile.validity_days())?;

    let cert = params
        .self_signed(root_key.signing_key())
        .map_err(|e| Error::Bootstrap(format!("failed to self-sign root certificate: {e}")))?;
    let root_cert = Certificate::from_der(cert.der())?;
    let issuer = create_issuer_cert(root_cert.subject(), &root_key)?;

    debug!(not_after = %root_cert.not_after(), "CA root certificate created");

    Ok(Ready {
        root_cert,
        root_key,
        issuer,
        next_serial: ROOT_SERIAL + 1,
    })
}

/// Rebuilds the issuer handle rcgen needs for signing.
///
/// Only the subject name and key of this handle end up in issued
/// certificates.
fn create_issuer_cert(subject: &DistinguishedName, key: &KeyPair) -> Result<rcgen::Certificate> {
    let mut params = CertificateParams::default();
    params.distinguished_name = subject.to_rcgen();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    params
        .self_signed(key.signing_key())
        .map_err(|e| Error::Bootstrap(format!("failed to create issuer handle: {e}")))
}

/// Backdates `not_before` by an hour to tolerate clock skew.
///
/// A window ending past year 9999 is [`Error::ProfileValidation`].
fn set_validity(params: &mut CertificateParams, days: u32) -> Result<()> {
    let now = Utc::now();
    let out_of_range =
        || Error::ProfileValidation(format!("validity of {days} days is out of range"));

    let not_after = Duration::try_days(i64::from(days))
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(out_of_range)?;

    params.not_before = to_rcgen_time(now - Duration::hours(1)).ok_or_else(out_of_range)?;
    params.not_after = to_rcgen_time(not_after).ok_or_else(out_of_range)?;
    Ok(())
}

/// Converts a chrono `DateTime` to rcgen `OffsetDateTime`.
fn to_rcgen_time(dt: DateTime<Utc>) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp()).ok()
}

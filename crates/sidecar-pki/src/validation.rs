//! Checks applied to issued material: validity windows, issuer linkage,
//! signatures, and key ownership.

use chrono::Utc;
use tracing::debug;
use x509_parser::prelude::*;

use crate::error::{Error, Result};
use crate::keygen::KeyPair;
use crate::types::Certificate;

/// Checks `cert` against the CA that should have issued it: inside its
/// validity window, issuer name equal to the CA subject, CA flag set on the
/// issuer, and a signature made by the CA key.
///
/// # Errors
///
/// [`Error::Expired`] / [`Error::NotYetValid`] for the window,
/// [`Error::Validation`] for the names or CA flag, and
/// [`Error::SignatureVerification`] for the signature.
pub fn validate_certificate(cert: &Certificate, ca_cert: &Certificate) -> Result<()> {
    debug!(subject = %cert.subject(), issuer = %ca_cert.subject(), "validating certificate");

    check_window(cert)?;

    if cert.issuer() != ca_cert.subject() {
        return Err(Error::Validation(format!(
            "'{}' names issuer '{}', expected '{}'",
            cert.subject(),
            cert.issuer(),
            ca_cert.subject()
        )));
    }
    if !ca_cert.is_ca() {
        return Err(Error::Validation(format!(
            "'{}' cannot issue certificates: basicConstraints CA is not set",
            ca_cert.subject()
        )));
    }

    verify_signature(cert, ca_cert)
}

/// Validates `chain`, leaf first and root last: each certificate against
/// the next, then the root against itself.
///
/// # Errors
///
/// Returns the first failing link; an empty slice is [`Error::Validation`].
pub fn validate_chain(chain: &[Certificate]) -> Result<()> {
    let Some(root) = chain.last() else {
        return Err(Error::Validation("empty certificate chain".into()));
    };

    for pair in chain.windows(2) {
        validate_certificate(&pair[0], &pair[1])?;
    }

    validate_self_signed(root)
}

/// Validates a self-signed root certificate: issuer equals subject, the
/// signature verifies against its own key, and it is inside its validity
/// window.
///
/// # Errors
///
/// Returns an error if any of the checks fails.
pub fn validate_self_signed(cert: &Certificate) -> Result<()> {
    if !cert.is_self_issued() {
        return Err(Error::Validation(format!(
            "certificate '{}' is not self-signed",
            cert.subject()
        )));
    }
    check_window(cert)?;
    verify_signature(cert, cert)
}

/// Checks that a private key belongs to a certificate.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the public keys differ.
pub fn validate_key_pair(key: &KeyPair, cert: &Certificate) -> Result<()> {
    if key.matches_certificate(cert) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "private key does not match certificate '{}'",
            cert.subject()
        )))
    }
}

/// True once `not_after` has passed.
#[must_use]
pub fn is_expired(cert: &Certificate) -> bool {
    cert.not_after() < Utc::now()
}

/// True while `not_before` is still in the future.
#[must_use]
pub fn is_not_yet_valid(cert: &Certificate) -> bool {
    cert.not_before() > Utc::now()
}

/// Inside the validity window right now.
#[must_use]
pub fn is_valid_now(cert: &Certificate) -> bool {
    !is_expired(cert) && !is_not_yet_valid(cert)
}

/// Time left before `cert` expires; `None` once it has.
#[must_use]
pub fn remaining_validity(cert: &Certificate) -> Option<chrono::Duration> {
    let left = cert.not_after() - Utc::now();
    (left > chrono::Duration::zero()).then_some(left)
}

fn check_window(cert: &Certificate) -> Result<()> {
    if is_expired(cert) {
        Err(Error::Expired)
    } else if is_not_yet_valid(cert) {
        Err(Error::NotYetValid)
    } else {
        Ok(())
    }
}

pub(crate) fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    let signed = parse(cert)?;
    let signer = parse(issuer)?;

    signed
        .verify_signature(Some(signer.public_key()))
        .map_err(|e| {
            Error::SignatureVerification(format!(
                "'{}' was not signed by '{}': {e:?}",
                cert.subject(),
                issuer.subject()
            ))
        })
}

fn parse(cert: &Certificate) -> Result<X509Certificate<'_>> {
    X509Certificate::from_der(cert.der())
        .map(|(_, parsed)| parsed)
        .map_err(|e| Error::Parse(format!("'{}': {e}", cert.subject())))
}

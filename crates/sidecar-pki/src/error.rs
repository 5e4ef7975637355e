//! PKI error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKI error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed availability zone / cluster input.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Filesystem failure.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact already exists and overwriting was not requested.
    #[error("refusing to overwrite existing artifact {} (use --force)", path.display())]
    OverwriteRefused {
        /// Path of the existing artifact.
        path: PathBuf,
    },

    /// Key generation failed or the requested strength is not allowed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A certificate profile is incomplete or used for the wrong purpose.
    #[error("invalid certificate profile: {0}")]
    ProfileValidation(String),

    /// The authority could not be bootstrapped.
    #[error("CA bootstrap failed: {0}")]
    Bootstrap(String),

    /// Persisted authority material is not a usable CA.
    #[error("invalid certificate authority: {0}")]
    InvalidAuthority(String),

    /// A signing request was rejected or could not be signed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Certificate, request or key parsing failed.
    #[error("parsing failed: {0}")]
    Parse(String),

    /// Certificate validation failed.
    #[error("certificate validation failed: {0}")]
    Validation(String),

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// Certificate has expired.
    #[error("certificate has expired")]
    Expired,

    /// Certificate not yet valid.
    #[error("certificate not yet valid")]
    NotYetValid,

    /// Subject Alternative Name error.
    #[error("SAN error: {0}")]
    San(String),
}

impl Error {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

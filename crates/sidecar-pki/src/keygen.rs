//! Key pair generation.
//!
//! EC keys come straight from `rcgen`. RSA keys are produced with the `rsa`
//! crate, exported as PKCS#8 and loaded back into `rcgen` for signing.

use std::fmt;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Certificate, KeyAlgorithm, PrivateKey};

/// Smallest RSA modulus the generator will produce.
pub const MIN_RSA_BITS: u32 = 2048;
/// Largest RSA modulus the generator will produce.
pub const MAX_RSA_BITS: u32 = 4096;

/// A private key together with its signing handle.
///
/// Each key pair is owned by exactly one CA or leaf and is deliberately not
/// `Clone`.
pub struct KeyPair {
    algorithm: KeyAlgorithm,
    private_key: PrivateKey,
    signing_key: rcgen::KeyPair,
}

impl KeyPair {
    /// Restores a key pair from PKCS#8 key material.
    ///
    /// The algorithm tag is recovered from the key itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the key is malformed or of an unsupported type.
    pub fn from_private_key(private_key: PrivateKey) -> Result<Self> {
        let signing_key = rcgen::KeyPair::try_from(private_key.der())
            .map_err(|e| Error::Parse(format!("failed to load private key: {e}")))?;

        let algorithm = detect_algorithm(&signing_key, &private_key)?;

        Ok(Self {
            algorithm,
            private_key,
            signing_key,
        })
    }

    /// Restores a key pair from a `PRIVATE KEY` PEM block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the PEM or the key is malformed.
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        Self::from_private_key(PrivateKey::from_pem(pem_text)?)
    }

    /// Algorithm and strength of this key.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// PKCS#8 private key material.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Raw public key bits, comparable with [`Certificate::public_key`].
    #[must_use]
    pub fn public_key_raw(&self) -> &[u8] {
        self.signing_key.public_key_raw()
    }

    /// True when `cert` embeds this key pair's public key.
    #[must_use]
    pub fn matches_certificate(&self, cert: &Certificate) -> bool {
        cert.public_key() == self.public_key_raw()
    }

    pub(crate) const fn signing_key(&self) -> &rcgen::KeyPair {
        &self.signing_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

fn detect_algorithm(
    signing_key: &rcgen::KeyPair,
    private_key: &PrivateKey,
) -> Result<KeyAlgorithm> {
    let alg = rcgen::PublicKeyData::algorithm(signing_key);
    if alg == &rcgen::PKCS_ECDSA_P256_SHA256 {
        Ok(KeyAlgorithm::EcdsaP256)
    } else if alg == &rcgen::PKCS_ECDSA_P384_SHA384 {
        Ok(KeyAlgorithm::EcdsaP384)
    } else if alg == &rcgen::PKCS_RSA_SHA256 {
        let rsa = RsaPrivateKey::from_pkcs8_der(private_key.der())
            .map_err(|e| Error::Parse(format!("failed to read RSA key: {e}")))?;
        Ok(KeyAlgorithm::rsa((rsa.size() * 8) as u32))
    } else {
        Err(Error::Parse(format!("unsupported key algorithm {alg:?}")))
    }
}

/// Produces fresh key pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    /// Generates a new key pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyGeneration`] if the requested RSA strength is outside
    /// `MIN_RSA_BITS..=MAX_RSA_BITS` or the backend fails.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<KeyPair> {
        info!(%algorithm, "generating key pair");

        let keypair = match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                let private_key = PrivateKey::new(generate_rsa_pkcs8(&mut OsRng, bits)?);
                let signing_key = rcgen::KeyPair::try_from(private_key.der())
                    .map_err(|e| Error::KeyGeneration(format!("failed to load RSA key: {e}")))?;
                KeyPair {
                    algorithm,
                    private_key,
                    signing_key,
                }
            }
            KeyAlgorithm::EcdsaP256 | KeyAlgorithm::EcdsaP384 => {
                let signing_key = rcgen::KeyPair::generate_for(algorithm.signature_algorithm())
                    .map_err(|e| Error::KeyGeneration(format!("EC key generation failed: {e}")))?;
                KeyPair {
                    algorithm,
                    private_key: PrivateKey::new(signing_key.serialize_der()),
                    signing_key,
                }
            }
        };

        debug!(%algorithm, "key pair generated");
        Ok(keypair)
    }
}

/// `rsa` panics if the RNG fails mid-generation, so the source is drawn from
/// once up front and a failure there surfaces as [`Error::KeyGeneration`].
fn generate_rsa_pkcs8<R: RngCore + CryptoRng>(rng: &mut R, bits: u32) -> Result<Vec<u8>> {
    if bits < MIN_RSA_BITS {
        return Err(Error::KeyGeneration(format!(
            "RSA keys below {MIN_RSA_BITS} bits are not allowed (requested {bits})"
        )));
    }
    if bits > MAX_RSA_BITS {
        return Err(Error::KeyGeneration(format!(
            "RSA keys above {MAX_RSA_BITS} bits are not supported (requested {bits})"
        )));
    }

    rng.try_fill_bytes(&mut [0u8; 32])
        .map_err(|e| Error::KeyGeneration(format!("entropy source unavailable: {e}")))?;

    let key = RsaPrivateKey::new(rng, bits as usize)
        .map_err(|e| Error::KeyGeneration(format!("RSA key generation failed: {e}")))?;
    let der = key
        .to_pkcs8_der()
        .map_err(|e| Error::KeyGeneration(format!("failed to encode RSA key: {e}")))?;
    Ok(der.as_bytes().to_vec())
}

//! PEM armour for DER-encoded artifacts.

use ::pem::{EncodeConfig, LineEnding, Pem};

use crate::error::{Error, Result};

/// Label of an X.509 certificate block.
pub const CERTIFICATE: &str = "CERTIFICATE";
/// Label of a PKCS#10 request block.
pub const CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
/// Label of a PKCS#8 private key block.
pub const PRIVATE_KEY: &str = "PRIVATE KEY";

/// Wraps DER bytes in a PEM block with 64-column lines and `\n` endings.
#[must_use]
pub fn encode(label: &str, der: &[u8]) -> String {
    let block = Pem::new(label, der);
    ::pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Extracts the DER bytes of the first PEM block carrying `label`.
///
/// Blocks with other labels are skipped.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the input is not well-formed PEM or holds no
/// `label` block.
pub fn decode(label: &str, input: &str) -> Result<Vec<u8>> {
    let blocks = ::pem::parse_many(input)
        .map_err(|e| Error::Parse(format!("malformed {label} PEM: {e}")))?;

    blocks
        .into_iter()
        .find(|block| block.tag() == label)
        .map(Pem::into_contents)
        .ok_or_else(|| Error::Parse(format!("no {label} PEM block found")))
}

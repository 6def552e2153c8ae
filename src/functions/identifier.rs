use super::common::truncate_to;
use super::errors::PseudonymizeError;
use super::pseudonymize::Pseudonymize;
use crate::hashing::Hasher;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const IDENTIFIER_HEX_DIGITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentifierEncoding {
    Base64,
    Hex,
}

/// Replaces a binary identifier by a 128-bit value derived from its SHA-256 hash.
pub(crate) struct IdentifierPseudonymizer<'a, H>
where
    H: Hasher,
{
    hasher: &'a H,
    encoding: IdentifierEncoding,
}

impl<'a, H> IdentifierPseudonymizer<'a, H>
where
    H: Hasher,
{
    pub(crate) fn new(hasher: &'a H, encoding: IdentifierEncoding) -> Self {
        Self { hasher, encoding }
    }

    /// First 16 hex digits of the digest, base64 encoded.
    fn derive(&self, value: &str) -> Vec<u8> {
        let digest = self.hasher.hex_digest(value);
        STANDARD
            .encode(truncate_to(IDENTIFIER_HEX_DIGITS, &digest))
            .into_bytes()
    }
}

impl<H> Pseudonymize for IdentifierPseudonymizer<'_, H>
where
    H: Hasher,
{
    fn pseudonymize(&self, value: &str) -> Result<String, PseudonymizeError> {
        let derived = self.derive(value);
        Ok(match self.encoding {
            IdentifierEncoding::Base64 => STANDARD.encode(derived),
            IdentifierEncoding::Hex => hex::encode(derived),
        })
    }
}

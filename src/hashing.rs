use num_bigint::{BigInt, ParseBigIntError};
use num_traits::Num;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid input: {}", .0.to_lowercase())]
    InvalidInput(String),
}

impl From<ParseBigIntError> for Error {
    fn from(err: ParseBigIntError) -> Self {
        Error::InvalidInput(format!("{err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub trait Hasher: Send + Sync {
    /// Lowercase hexadecimal digest of `input`.
    fn hex_digest(&self, input: &str) -> String;

    /// The digest of `input` read as one unsigned integer, in decimal.
    fn hash(&self, input: &str) -> Result<String> {
        let hash_as_number = BigInt::from_str_radix(&self.hex_digest(input), 16)?;
        Ok(hash_as_number.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    pub fn new() -> Self {
        Self {}
    }
}

impl Hasher for Sha256Hasher {
    fn hex_digest(&self, input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}

use super::errors::PseudonymizeError;

pub(crate) trait Pseudonymize {
    fn pseudonymize(&self, value: &str) -> Result<String, PseudonymizeError>;
}

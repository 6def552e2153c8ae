use super::common::random_letters;
use super::errors::PseudonymizeError;
use super::pseudonymize::Pseudonymize;

const PATIENT_NAME_PREFIX: &str = "PATIENT^";
const PATIENT_NAME_LETTERS: usize = 8;

/// Replaces a person name or patient identifier by `PATIENT^` and 8 random letters.
///
/// Not reproducible: the same input gives a different name on every call.
pub(crate) struct PatientNamePseudonymizer;

impl Pseudonymize for PatientNamePseudonymizer {
    fn pseudonymize(&self, _value: &str) -> Result<String, PseudonymizeError> {
        Ok(format!(
            "{}{}",
            PATIENT_NAME_PREFIX,
            random_letters(PATIENT_NAME_LETTERS)
        ))
    }
}

/// Replaces a non-empty value by random letters of a fixed length.
pub(crate) struct RandomStringPseudonymizer {
    length: usize,
}

impl RandomStringPseudonymizer {
    pub(crate) fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Pseudonymize for RandomStringPseudonymizer {
    fn pseudonymize(&self, value: &str) -> Result<String, PseudonymizeError> {
        if value.is_empty() {
            return Ok(String::new());
        }
        Ok(random_letters(self.length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_patient_name() {
        let pattern = Regex::new(r"^PATIENT\^[A-Za-z]{8}$").unwrap();
        let result = PatientNamePseudonymizer.pseudonymize("DOE^JOHN").unwrap();
        assert!(pattern.is_match(&result), "{result}");
    }

    #[test]
    fn test_random_string() {
        let pseudonymizer = RandomStringPseudonymizer::new(16);
        let result = pseudonymizer.pseudonymize("ACC123").unwrap();
        assert_eq!(result.len(), 16);
        assert_ne!(result, "ACC123");
        assert_eq!(pseudonymizer.pseudonymize("").unwrap(), "");
    }
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

static ORG_ROOT_REGEX: OnceLock<Regex> = OnceLock::new();

const ORG_ROOT_MAX_LENGTH: usize = 32;
pub(crate) const ORG_ROOT_DEFAULT_VALUE: &str = "9999";

/// The [`OrgRoot`] struct represents the organization UID root used as prefix of
/// every pseudonymized UID.
///
/// The [`OrgRoot`] must follow DICOM UID format rules:
/// - Start with a digit 1-9
/// - Contain only numbers and dots
///
/// It also must not have more than 32 characters.
///
/// # Example
///
/// ```
/// use dicom_deid::config::OrgRoot;
///
/// let org_root = "1.2.840.123".parse::<OrgRoot>().unwrap();
/// assert_eq!(org_root.as_prefix(), "1.2.840.123.");
///
/// // Invalid org root (not starting with 1-9)
/// let invalid = "0.1.2".parse::<OrgRoot>();
/// assert!(invalid.is_err());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct OrgRoot(String);

#[derive(Error, Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[error("{0} is not a valid organization root")]
pub struct OrgRootError(pub(crate) String);

impl OrgRoot {
    pub fn new(org_root: &str) -> Result<Self, OrgRootError> {
        let regex = ORG_ROOT_REGEX.get_or_init(|| {
            Regex::new(&format!(
                r"^([1-9][0-9.]{{0,{}}})?$",
                ORG_ROOT_MAX_LENGTH - 1
            ))
            .unwrap()
        });

        if !regex.is_match(org_root) {
            return Err(OrgRootError(format!(
                "{org_root:?}: organization root must be empty or start with 1-9, contain only numbers and dots, and be no longer than {ORG_ROOT_MAX_LENGTH} characters"
            )));
        }

        Ok(Self(org_root.into()))
    }

    /// Returns the [`OrgRoot`] formatted as a UID prefix.
    ///
    /// A dot is appended unless the root is empty or already ends with one.
    pub fn as_prefix(&self) -> String {
        if !self.0.is_empty() && !self.0.ends_with('.') {
            format!("{}.", self.0.trim())
        } else {
            self.0.trim().into()
        }
    }
}

impl Default for OrgRoot {
    fn default() -> Self {
        Self(ORG_ROOT_DEFAULT_VALUE.into())
    }
}

impl FromStr for OrgRoot {
    type Err = OrgRootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrgRoot::new(s)
    }
}

impl AsRef<str> for OrgRoot {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

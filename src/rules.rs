use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown rule: {0}")]
pub struct UnknownRuleError(pub String);

/// What happens to an attribute during de-identification.
///
/// Variants are ordered from least to most strict, so that the rule applying
/// to a nested attribute is the maximum over its tag path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rule {
    #[serde(rename = "CONSERVER")]
    Keep,
    #[serde(rename = "PSEUDONYMISER")]
    Pseudonymize,
    #[serde(rename = "EFFACER")]
    Empty,
    #[serde(rename = "RETIRER")]
    Remove,
}

impl Rule {
    /// Name of the rule as written in recipe files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Keep => "CONSERVER",
            Rule::Pseudonymize => "PSEUDONYMISER",
            Rule::Empty => "EFFACER",
            Rule::Remove => "RETIRER",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rule {
    type Err = UnknownRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONSERVER" => Ok(Rule::Keep),
            "PSEUDONYMISER" => Ok(Rule::Pseudonymize),
            "EFFACER" => Ok(Rule::Empty),
            "RETIRER" => Ok(Rule::Remove),
            other => Err(UnknownRuleError(other.to_string())),
        }
    }
}

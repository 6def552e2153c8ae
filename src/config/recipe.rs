use super::ConfigError;
use crate::column::{hex_to_tag, tag_to_hex};
use crate::rules::Rule;
use dicom_core::Tag;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BUILTIN_RECIPE: &str = include_str!("recipe.json");

/// Rule applying to a tag wherever it appears.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralRule {
    pub name: String,
    pub default: String,
    pub rule: Rule,
}

/// Rule applying to a tag only when it is nested inside `sequence`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecificRule {
    pub sequence: Tag,
    pub rule: Rule,
}

#[derive(Serialize, Deserialize)]
struct RawSpecificRule {
    sequence: String,
    rule: String,
}

// Recipe file layout, with tags and rules still as strings
#[derive(Serialize, Deserialize, Default)]
struct RawRecipe {
    #[serde(default)]
    general_rules: BTreeMap<String, (String, String, String)>,
    #[serde(default)]
    specific_rules: BTreeMap<String, RawSpecificRule>,
}

/// The de-identification recipe: a rule per tag, plus rules scoped to a sequence.
///
/// # Example
///
/// ```
/// use dicom_deid::config::Recipe;
/// use dicom_deid::rules::Rule;
/// use dicom_deid::tags;
///
/// let recipe = Recipe::from_json(r#"{
///     "general_rules": {"0x00100010": ["PatientName", "", "PSEUDONYMISER"]},
///     "specific_rules": {"0x00080100": {"sequence": "0x00400260", "rule": "EFFACER"}}
/// }"#).unwrap();
///
/// assert_eq!(recipe.general_rule(&tags::PATIENT_NAME).unwrap().rule, Rule::Pseudonymize);
/// assert_eq!(recipe.specific_rule(&tags::CODE_VALUE).unwrap().rule, Rule::Empty);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipe {
    general_rules: BTreeMap<Tag, GeneralRule>,
    specific_rules: BTreeMap<Tag, SpecificRule>,
}

fn parse_tag(tag: &str) -> Result<Tag, ConfigError> {
    hex_to_tag(tag).ok_or_else(|| ConfigError::InvalidTag(tag.to_string()))
}

fn parse_rule(rule: &str) -> Result<Rule, ConfigError> {
    rule.parse()
        .map_err(|_| ConfigError::UnknownRule(rule.to_string()))
}

impl TryFrom<RawRecipe> for Recipe {
    type Error = ConfigError;

    fn try_from(raw: RawRecipe) -> Result<Self, Self::Error> {
        let mut recipe = Recipe::new();
        for (tag, (name, default, rule)) in raw.general_rules {
            let rule = parse_rule(&rule)?;
            recipe.insert_general(parse_tag(&tag)?, GeneralRule { name, default, rule });
        }
        for (tag, specific) in raw.specific_rules {
            let rule = SpecificRule {
                sequence: parse_tag(&specific.sequence)?,
                rule: parse_rule(&specific.rule)?,
            };
            recipe.insert_specific(parse_tag(&tag)?, rule);
        }
        Ok(recipe)
    }
}

impl From<&Recipe> for RawRecipe {
    fn from(recipe: &Recipe) -> Self {
        let general_rules = recipe
            .general_rules
            .iter()
            .map(|(tag, general)| {
                (
                    tag_to_hex(*tag),
                    (
                        general.name.clone(),
                        general.default.clone(),
                        general.rule.as_str().to_string(),
                    ),
                )
            })
            .collect();
        let specific_rules = recipe
            .specific_rules
            .iter()
            .map(|(tag, specific)| {
                (
                    tag_to_hex(*tag),
                    RawSpecificRule {
                        sequence: tag_to_hex(specific.sequence),
                        rule: specific.rule.as_str().to_string(),
                    },
                )
            })
            .collect();
        RawRecipe {
            general_rules,
            specific_rules,
        }
    }
}

impl Recipe {
    /// An empty recipe, under which every attribute is removed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawRecipe =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidRecipe(e.to_string()))?;
        Recipe::try_from(raw)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&RawRecipe::from(self))
            .map_err(|e| ConfigError::InvalidRecipe(e.to_string()))
    }

    /// The recipe shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(BUILTIN_RECIPE)
    }

    /// Loads the recipe at `path`, falling back to [`Recipe::builtin`] when no
    /// path is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
                Self::from_json(&json)
            }
            _ => {
                warn!(
                    "No customized recipe found at path {:?}. Defaulting to the built-in recipe",
                    path
                );
                Self::builtin()
            }
        }
    }

    pub fn insert_general(&mut self, tag: Tag, rule: GeneralRule) -> Option<GeneralRule> {
        self.general_rules.insert(tag, rule)
    }

    pub fn insert_specific(&mut self, tag: Tag, rule: SpecificRule) -> Option<SpecificRule> {
        self.specific_rules.insert(tag, rule)
    }

    pub fn general_rule(&self, tag: &Tag) -> Option<&GeneralRule> {
        self.general_rules.get(tag)
    }

    pub fn specific_rule(&self, tag: &Tag) -> Option<&SpecificRule> {
        self.specific_rules.get(tag)
    }

    pub fn len(&self) -> usize {
        self.general_rules.len() + self.specific_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.general_rules.is_empty() && self.specific_rules.is_empty()
    }
}

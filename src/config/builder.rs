use super::{AuthorizedWords, Config, GeneralRule, OrgRoot, Recipe, SpecificRule};
use crate::rules::Rule;
use dicom_core::Tag;

/// A builder for [`Config`].
///
/// # Example
///
/// ```
/// use dicom_deid::config::ConfigBuilder;
/// use dicom_deid::rules::Rule;
/// use dicom_deid::tags;
///
/// let config = ConfigBuilder::new()
///     .org_root("1.2.840.123".parse().unwrap())
///     .general_rule(tags::PATIENT_NAME, "PatientName", Rule::Pseudonymize)
///     .general_rule(tags::PATIENT_ID, "PatientID", Rule::Remove)
///     .specific_rule(tags::CODE_MEANING, tags::PERFORMED_PROTOCOL_CODE_SEQUENCE, Rule::Empty)
///     .build();
/// assert_eq!(config.recipe().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    /// Starts from an empty recipe, under which every attribute is removed.
    pub fn new() -> Self {
        ConfigBuilder(Config::default())
    }

    /// Replaces the whole recipe.
    pub fn recipe(mut self, recipe: Recipe) -> Self {
        self.0.recipe = recipe;
        self
    }

    /// Sets the general rule of a tag.
    pub fn general_rule(mut self, tag: Tag, name: &str, rule: Rule) -> Self {
        self.0.recipe.insert_general(
            tag,
            GeneralRule {
                name: name.into(),
                default: String::new(),
                rule,
            },
        );
        self
    }

    /// Sets the rule of a tag nested inside the `sequence` attribute.
    pub fn specific_rule(mut self, tag: Tag, sequence: Tag, rule: Rule) -> Self {
        self.0
            .recipe
            .insert_specific(tag, SpecificRule { sequence, rule });
        self
    }

    /// Sets the [`OrgRoot`] used as prefix of pseudonymized UIDs. Defaults to `9999`.
    pub fn org_root(mut self, org_root: OrgRoot) -> Self {
        self.0.org_root = org_root;
        self
    }

    pub fn authorized_words(mut self, authorized_words: AuthorizedWords) -> Self {
        self.0.authorized_words = authorized_words;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Immutable de-identification configuration.
//!
//! A [`Config`] is built once, either with [`ConfigBuilder`] or
//! [`Config::load`], and then shared by reference with every worker.

pub mod authorized_words;
pub mod builder;
pub mod org_root;
pub mod recipe;

pub use authorized_words::{levenshtein_distance, AuthorizedWords};
pub use builder::ConfigBuilder;
pub use org_root::{OrgRoot, OrgRootError};
pub use recipe::{GeneralRule, Recipe, SpecificRule};

use crate::DeidError;
use dicom_core::Tag;
use log::info;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum ConfigError {
    #[error("invalid organization root: {0}")]
    InvalidOrgRoot(String),

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("invalid tag in recipe: {0}")]
    InvalidTag(String),

    #[error("unknown rule: {0}")]
    UnknownRule(String),

    #[error("{0}")]
    Io(String),
}

impl From<OrgRootError> for ConfigError {
    fn from(err: OrgRootError) -> Self {
        ConfigError::InvalidOrgRoot(err.0)
    }
}

impl From<ConfigError> for DeidError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownRule(rule) => DeidError::UnknownRule(rule),
            other => DeidError::Config(format!("{other}")),
        }
    }
}

pub(crate) fn is_curve_tag(tag: &Tag) -> bool {
    (tag.group() & 0xFF00) == 0x5000
}

pub(crate) fn is_overlay_tag(tag: &Tag) -> bool {
    (tag.group() & 0xFF00) == 0x6000
}

/// Overlay comments (`60xx,3000`) and overlay data (`60xx,4000`).
pub(crate) fn is_retired_overlay_tag(tag: &Tag) -> bool {
    is_overlay_tag(tag) && matches!(tag.element(), 0x3000 | 0x4000)
}

/// Configuration for DICOM de-identification.
///
/// * `recipe` - The [`Recipe`] mapping tags to rules
/// * `org_root` - The [`OrgRoot`] prefixing every pseudonymized UID
/// * `authorized_words` - The [`AuthorizedWords`] left visible when censoring images
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    recipe: Recipe,
    org_root: OrgRoot,
    authorized_words: AuthorizedWords,
}

impl Config {
    /// Loads the recipe and the authorized words from disk.
    ///
    /// A missing recipe falls back to the built-in one. A missing words file is
    /// an error; no words file means every detected word gets censored.
    pub fn load(
        recipe_path: Option<&Path>,
        authorized_words_path: Option<&Path>,
        org_root: OrgRoot,
    ) -> Result<Self, ConfigError> {
        let recipe = Recipe::load(recipe_path)?;
        let authorized_words = match authorized_words_path {
            Some(path) => AuthorizedWords::load(path)?,
            None => {
                info!("No authorized words file given. All OCR detected words will be erased");
                AuthorizedWords::default()
            }
        };

        Ok(ConfigBuilder::new()
            .recipe(recipe)
            .org_root(org_root)
            .authorized_words(authorized_words)
            .build())
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn org_root(&self) -> &OrgRoot {
        &self.org_root
    }

    pub fn authorized_words(&self) -> &AuthorizedWords {
        &self.authorized_words
    }
}

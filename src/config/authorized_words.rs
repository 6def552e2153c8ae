use super::ConfigError;
use std::collections::BTreeSet;
use std::path::Path;

/// Edit distance between two words (insertions, deletions and substitutions).
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Words that may stay visible on an image even when the OCR detects them.
///
/// Words are stored upper-cased. A detected word matches when its upper-cased
/// form is at most `tolerance` edits away from an authorized word.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizedWords {
    words: BTreeSet<String>,
    tolerance: usize,
}

impl AuthorizedWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_uppercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words, tolerance: 0 }
    }

    /// Parses a words file: one word per line.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("cannot load {}: {}", path.display(), e)))?;
        Ok(Self::from_text(&text))
    }

    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> usize {
        self.tolerance
    }

    pub fn contains(&self, word: &str) -> bool {
        let word = word.trim().to_uppercase();
        if self.words.contains(&word) {
            return true;
        }
        self.tolerance > 0
            && self
                .words
                .iter()
                .any(|authorized| levenshtein_distance(authorized, &word) <= self.tolerance)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

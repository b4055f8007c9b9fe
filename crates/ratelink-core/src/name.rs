//! Business-name similarity.

use serde::{Deserialize, Serialize};

/// How names are prepared before comparison. One policy applies to both
/// sides of every comparison in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameNormalization {
    /// Compare names exactly as stored.
    #[default]
    AsGiven,
    /// Lowercase and drop a leading "the ".
    Folded,
}

impl NameNormalization {
    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::AsGiven => name.to_string(),
            Self::Folded => strip_leading_article(name).to_lowercase(),
        }
    }
}

/// Drop a case-insensitive leading "the " and trim. A name that is nothing
/// but the article is returned trimmed and unchanged.
pub fn strip_leading_article(name: &str) -> &str {
    let trimmed = name.trim_start();
    match trimmed.get(..4) {
        Some(head) if head.eq_ignore_ascii_case("the ") => {
            let rest = trimmed[4..].trim();
            if rest.is_empty() { trimmed.trim() } else { rest }
        }
        _ => trimmed.trim_end(),
    }
}

/// Jaro-Winkler similarity in `[0, 1]`. Symmetric; no normalisation applied.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

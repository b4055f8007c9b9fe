//! Query planning: turn one imprecise (name, postcode) pair into the ordered
//! list of lookups to try.
//!
//! # Order
//!
//! Name variants are tried most-specific first:
//!
//! 1. the full name (leading "The" removed)
//! 2. prefixes, dropping one trailing word at a time ("Fish Bar Ltd" → "Fish Bar" → "Fish")
//! 3. suffixes, dropping one leading word at a time ("Fish Bar Ltd" → "Bar Ltd" → "Ltd")
//!
//! Trailing words are dropped first since that is where legal suffixes such as
//! "Ltd" tend to sit. Each name variant is queried with the full postcode and
//! then with its outward code before moving on.

use crate::name::strip_leading_article;
use crate::postcode::postcode_variants;

/// A single lookup to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query<'a> {
    pub name: &'a str,
    pub postcode: &'a str,
}

/// All lookups for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    names: Vec<String>,
    postcodes: [String; 2],
}

impl QueryPlan {
    pub fn new(name: &str, postcode: &str) -> Self {
        Self {
            names: name_variants(name),
            postcodes: postcode_variants(postcode),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn postcodes(&self) -> &[String; 2] {
        &self.postcodes
    }

    /// Number of lookups the plan issues.
    pub fn len(&self) -> usize {
        self.names.len() * self.postcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Lookups in order: outer loop over names, inner loop over postcodes.
    pub fn queries(&self) -> impl Iterator<Item = Query<'_>> {
        self.names.iter().flat_map(move |name| {
            self.postcodes.iter().map(move |postcode| Query {
                name: name.as_str(),
                postcode: postcode.as_str(),
            })
        })
    }
}

/// Name variants for an n-word name: 2n-1 strings, full name first.
///
/// Duplicates between the prefix and suffix halves are kept.
pub fn name_variants(name: &str) -> Vec<String> {
    let tokens: Vec<&str> = strip_leading_article(name).split_whitespace().collect();
    let n = tokens.len();
    if n == 0 {
        return Vec::new();
    }

    let mut variants: Vec<String> = (1..=n).rev().map(|end| tokens[..end].join(" ")).collect();
    variants.extend((1..n).map(|start| tokens[start..].join(" ")));
    variants
}

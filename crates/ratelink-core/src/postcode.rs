//! Postcode normalisation and granularity comparison for UK postcodes.
//!
//! # UK postcode structure
//!
//! - Outward code (area + district): "BN1", "SW1A", "M1"
//! - Inward code (sector digit + unit): "2AB"
//! - Full postcode: "BN1 2AB"; the sector is "BN1 2"
//!
//! Datasets disagree on granularity: one side may carry only the outward
//! code, or spacing and case may differ. Comparison therefore works on three
//! tiers rather than plain equality.

use serde::{Deserialize, Serialize};

/// How strongly two postcodes agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PostcodeConfidence {
    /// Different outward codes, different sectors, or a postcode is missing.
    None,
    /// Same outward code, and either one side is partial or the sector digit agrees.
    Partial,
    /// Identical after normalisation.
    Full,
}

impl PostcodeConfidence {
    pub fn value(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Partial => 0.5,
            Self::Full => 1.0,
        }
    }
}

impl std::fmt::Display for PostcodeConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Trim, collapse internal whitespace runs to a single space, lowercase.
///
/// "  BN1   2AB " → "bn1 2ab"
pub fn normalize_postcode(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split a normalised postcode into its outward code and optional remainder.
fn split_parts(normalized: &str) -> (&str, Option<&str>) {
    match normalized.split_once(' ') {
        Some((area, rest)) => (area, Some(rest)),
        None => (normalized, None),
    }
}

/// Compare two postcodes. First matching rule wins:
///
/// 1. identical after normalisation → `Full`
/// 2. same outward code, one side has no inward code → `Partial`
/// 3. same outward code, inward codes start with the same character → `Partial`
/// 4. otherwise → `None`
///
/// A postcode that is empty after normalisation never matches.
pub fn compare_postcodes(a: &str, b: &str) -> PostcodeConfidence {
    let a = normalize_postcode(a);
    let b = normalize_postcode(b);
    if a.is_empty() || b.is_empty() {
        return PostcodeConfidence::None;
    }
    if a == b {
        return PostcodeConfidence::Full;
    }

    let (area_a, rest_a) = split_parts(&a);
    let (area_b, rest_b) = split_parts(&b);
    if area_a != area_b {
        return PostcodeConfidence::None;
    }

    match (rest_a, rest_b) {
        (None, _) | (_, None) => PostcodeConfidence::Partial,
        (Some(x), Some(y)) if x.chars().next() == y.chars().next() => PostcodeConfidence::Partial,
        _ => PostcodeConfidence::None,
    }
}

/// The two postcode forms queried for every name variant: the postcode as
/// given, then its outward code alone. Both are equal when there is no space.
pub fn postcode_variants(postcode: &str) -> [String; 2] {
    let full = postcode.trim().to_string();
    let outward = full.split(' ').next().unwrap_or_default().to_string();
    [full, outward]
}

//! Decide which accumulated candidate, if any, is the same business.
//!
//! Postcode agreement gates a candidate; name similarity decides once the
//! gate is passed. Weaker postcode evidence needs a stronger name score.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::Candidate;
use crate::name::{NameNormalization, name_similarity};
use crate::postcode::{PostcodeConfidence, compare_postcodes};
use crate::record::{CachedRecord, MatchDecision};

/// Which accepted candidate wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Stop at the first acceptable candidate in accumulation order.
    #[default]
    FirstAcceptable,
    /// Scan everything; highest (postcode tier, name score) wins, earliest on ties.
    BestAccepted,
}

/// Acceptance thresholds and policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Minimum name score when postcodes agree fully.
    pub full_postcode_threshold: f64,
    /// Minimum name score when postcodes agree on the outward code only.
    pub partial_postcode_threshold: f64,
    pub names: NameNormalization,
    pub selection: Selection,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            full_postcode_threshold: 0.7,
            partial_postcode_threshold: 0.85,
            names: NameNormalization::AsGiven,
            selection: Selection::FirstAcceptable,
        }
    }
}

impl MatchPolicy {
    pub fn accepts(&self, confidence: PostcodeConfidence, name_score: f64) -> bool {
        match confidence {
            PostcodeConfidence::Full => name_score >= self.full_postcode_threshold,
            PostcodeConfidence::Partial => name_score >= self.partial_postcode_threshold,
            PostcodeConfidence::None => false,
        }
    }
}

/// Postcode tier and name score of one candidate against the record.
/// Missing candidate fields score as non-matching on that dimension.
fn assess(
    record_name: &str,
    record_postcode: &str,
    candidate: &Candidate,
    names: NameNormalization,
) -> (PostcodeConfidence, f64) {
    let confidence = candidate
        .postcode()
        .map(|pc| compare_postcodes(record_postcode, pc))
        .unwrap_or(PostcodeConfidence::None);
    let score = candidate
        .business_name()
        .map(|name| name_similarity(record_name, &names.apply(name)))
        .unwrap_or(0.0);
    (confidence, score)
}

/// Run the matcher over one cached record.
///
/// Pure and deterministic: the same record and policy always produce the
/// same decision.
pub fn match_record(record: &CachedRecord, policy: &MatchPolicy) -> MatchDecision {
    if record.results.is_empty() {
        debug!(id = %record.id, "no candidates");
        return MatchDecision::unmatched(&record.id);
    }

    let record_name = policy.names.apply(&record.name);
    let mut best: Option<(&Candidate, PostcodeConfidence, f64)> = None;

    for candidate in &record.results {
        let (confidence, score) = assess(&record_name, &record.postcode, candidate, policy.names);
        debug!(
            id = %record.id,
            candidate = candidate.business_name().unwrap_or_default(),
            postcode_confidence = confidence.value(),
            name_score = score,
            "assessed candidate"
        );

        if !policy.accepts(confidence, score) {
            continue;
        }
        match policy.selection {
            Selection::FirstAcceptable => {
                best = Some((candidate, confidence, score));
                break;
            }
            Selection::BestAccepted => {
                let better = best.is_none_or(|(_, c, s)| (confidence, score) > (c, s));
                if better {
                    best = Some((candidate, confidence, score));
                }
            }
        }
    }

    match best {
        Some((candidate, confidence, score)) => MatchDecision {
            record_id: record.id.clone(),
            matched: Some(candidate.clone()),
            confidence: Some(confidence),
            name_score: Some(score),
        },
        None => MatchDecision::unmatched(&record.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(name: &str, postcode: &str) -> Candidate {
        Candidate::from_value(json!({"BusinessName": name, "PostCode": postcode})).unwrap()
    }

    fn record(name: &str, postcode: &str, results: Vec<Candidate>) -> CachedRecord {
        CachedRecord {
            id: "g1".into(),
            name: name.into(),
            location: "1 North Street".into(),
            postcode: postcode.into(),
            results,
            crawled_at: None,
        }
    }

    #[test]
    fn full_postcode_and_similar_name_matches() {
        let rec = record("The Fish Bar", "BN1 2AB", vec![candidate("Fish Bar", "BN1 2AB")]);
        let decision = match_record(&rec, &MatchPolicy::default());
        assert!(decision.is_match());
        assert_eq!(decision.record_id, "g1");
        assert_eq!(decision.confidence, Some(PostcodeConfidence::Full));
        assert_eq!(decision.matched.unwrap().business_name(), Some("Fish Bar"));
        assert!(decision.name_score.unwrap() >= 0.7);
    }

    #[test]
    fn different_sector_is_rejected() {
        let rec = record("The Fish Bar", "BN1 2AB", vec![candidate("Fish Bar", "BN1 9ZZ")]);
        let decision = match_record(&rec, &MatchPolicy::default());
        assert_eq!(decision, MatchDecision::unmatched("g1"));
    }

    #[test]
    fn partial_postcode_needs_stronger_name() {
        // "The Fish Bar" vs "Fish Bar" scores about 0.81: enough at full, not at partial.
        let rec = record("The Fish Bar", "BN1 2AB", vec![candidate("Fish Bar", "BN1 2ZZ")]);
        assert!(!match_record(&rec, &MatchPolicy::default()).is_match());

        let rec = record("Fish Bar", "BN1 2AB", vec![candidate("Fish Bar", "BN1")]);
        let decision = match_record(&rec, &MatchPolicy::default());
        assert_eq!(decision.confidence, Some(PostcodeConfidence::Partial));
    }

    #[test]
    fn postcode_mismatch_never_accepts() {
        let rec = record("Fish Bar", "BN1 2AB", vec![candidate("Fish Bar", "BN2 2AB")]);
        assert!(!match_record(&rec, &MatchPolicy::default()).is_match());
    }

    #[test]
    fn empty_candidates_is_unmatched() {
        let rec = record("The Fish Bar", "BN1 2AB", Vec::new());
        let decision = match_record(&rec, &MatchPolicy::default());
        assert!(!decision.is_match());
        assert!(decision.confidence.is_none());
    }

    #[test]
    fn missing_fields_do_not_fail_the_decision() {
        let no_postcode = Candidate::from_value(json!({"BusinessName": "Fish Bar"})).unwrap();
        let no_name = Candidate::from_value(json!({"PostCode": "BN1 2AB"})).unwrap();
        let good = candidate("Fish Bar", "BN1 2AB");
        let rec = record("Fish Bar", "BN1 2AB", vec![no_postcode, no_name, good.clone()]);
        let decision = match_record(&rec, &MatchPolicy::default());
        assert_eq!(decision.matched, Some(good));
    }

    #[test]
    fn first_acceptable_wins_over_better_later_candidate() {
        let first = candidate("Fish Bar Ltd", "BN1 2AB");
        let exact = candidate("Fish Bar", "BN1 2AB");
        let rec = record("Fish Bar", "BN1 2AB", vec![first.clone(), exact.clone()]);

        let decision = match_record(&rec, &MatchPolicy::default());
        assert_eq!(decision.matched, Some(first));

        let best = MatchPolicy {
            selection: Selection::BestAccepted,
            ..MatchPolicy::default()
        };
        assert_eq!(match_record(&rec, &best).matched, Some(exact));
    }

    #[test]
    fn folded_names_ignore_case_and_article() {
        let rec = record("THE FISH BAR", "BN1 2AB", vec![candidate("fish bar", "BN1 2AB")]);
        assert!(!match_record(&rec, &MatchPolicy::default()).is_match());

        let folded = MatchPolicy {
            names: NameNormalization::Folded,
            ..MatchPolicy::default()
        };
        let decision = match_record(&rec, &folded);
        assert_eq!(decision.name_score, Some(1.0));
        // The stored candidate is returned untouched.
        assert_eq!(decision.matched.unwrap().business_name(), Some("fish bar"));
    }

    #[test]
    fn matching_is_deterministic() {
        let rec = record(
            "The Fish Bar",
            "BN1 2AB",
            vec![candidate("Chip Shop", "BN1 2AB"), candidate("Fish Bar", "BN1 2AB")],
        );
        let policy = MatchPolicy::default();
        assert_eq!(match_record(&rec, &policy), match_record(&rec, &policy));
    }
}

//! Record types that flow through the linkage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::postcode::PostcodeConfidence;

/// One row of the business dataset to be linked.
///
/// IDs are unique across a feed; duplicates are dropped at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub postcode: String,
}

impl InputRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        postcode: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            postcode: postcode.into(),
        }
    }
}

/// The persisted outcome of one complete crawl.
///
/// Written once per record ID. An empty `results` list means the search ran
/// to completion and found nothing, which is different from a record that
/// has no cache entry at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub id: String,
    pub name: String,
    pub location: String,
    pub postcode: String,
    pub results: Vec<Candidate>,
    /// Absent in entries written before the timestamp was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawled_at: Option<DateTime<Utc>>,
}

impl CachedRecord {
    /// Build the cache entry for `input` from the candidates its crawl found.
    pub fn from_crawl(input: &InputRecord, results: Vec<Candidate>) -> Self {
        Self {
            id: input.id.clone(),
            name: input.name.clone(),
            location: input.address.clone(),
            postcode: input.postcode.clone(),
            results,
            crawled_at: Some(Utc::now()),
        }
    }
}

/// Which candidate, if any, was accepted for a cached record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    pub record_id: String,
    pub matched: Option<Candidate>,
    /// Postcode tier of the accepted candidate.
    pub confidence: Option<PostcodeConfidence>,
    /// Name similarity of the accepted candidate.
    pub name_score: Option<f64>,
}

impl MatchDecision {
    pub fn unmatched(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            matched: None,
            confidence: None,
            name_score: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

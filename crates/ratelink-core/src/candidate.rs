//! Establishments returned by the ratings service.
//!
//! A [`Candidate`] keeps the raw JSON object exactly as the service sent it,
//! so nothing is lost between crawl and tabulation. Only the handful of
//! fields the matcher and the exporter need get typed accessors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sub-scores reported under the `scores` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Hygiene,
    Structural,
    ConfidenceInManagement,
}

impl ScoreKind {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Hygiene => "Hygiene",
            Self::Structural => "Structural",
            Self::ConfidenceInManagement => "ConfidenceInManagement",
        }
    }
}

/// One establishment record. Equality is structural over every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(Map<String, Value>);

impl Candidate {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything other than an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn business_name(&self) -> Option<&str> {
        self.text("BusinessName")
    }

    pub fn postcode(&self) -> Option<&str> {
        self.text("PostCode")
    }

    pub fn address_line(&self, line: u8) -> Option<&str> {
        self.text(&format!("AddressLine{line}"))
    }

    pub fn rating_date(&self) -> Option<&str> {
        self.text("RatingDate")
    }

    /// FSA hygiene register ID, rendered as text whether sent as a number or string.
    pub fn fhrsid(&self) -> Option<String> {
        self.0.get("FHRSID").and_then(scalar_to_string)
    }

    /// Rating values are usually "0".."5" but may be words such as "Exempt".
    pub fn rating_value(&self) -> Option<String> {
        self.0.get("RatingValue").and_then(scalar_to_string)
    }

    pub fn score(&self, kind: ScoreKind) -> Option<String> {
        self.0
            .get("scores")
            .and_then(Value::as_object)
            .and_then(|scores| scores.get(kind.field()))
            .and_then(scalar_to_string)
    }

    /// Canonical content key. Object keys serialize in sorted order, so two
    /// structurally equal candidates always yield the same string.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Insertion-ordered set of candidates with structural de-duplication.
#[derive(Debug, Default)]
pub struct CandidateSet {
    seen: HashSet<String>,
    items: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `candidate` unless an identical one is already present.
    /// Returns whether it was added.
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        if self.seen.insert(candidate.fingerprint()) {
            self.items.push(candidate);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.items
    }
}

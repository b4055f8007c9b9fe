//! CSV export of match decisions.

use std::io::Write;

use anyhow::Context;
use ratelink_core::{MatchDecision, ScoreKind};
use serde::Serialize;

/// One matched record, flattened to the columns the rating dataset uses.
#[derive(Debug, Serialize)]
pub struct MatchRow {
    #[serde(rename = "id1")]
    pub id: String,
    #[serde(rename = "FHRSID")]
    pub fhrsid: Option<String>,
    #[serde(rename = "BusinessName")]
    pub business_name: Option<String>,
    #[serde(rename = "AddressLine1")]
    pub address_line_1: Option<String>,
    #[serde(rename = "AddressLine2")]
    pub address_line_2: Option<String>,
    #[serde(rename = "AddressLine3")]
    pub address_line_3: Option<String>,
    #[serde(rename = "AddressLine4")]
    pub address_line_4: Option<String>,
    #[serde(rename = "PostCode")]
    pub postcode: Option<String>,
    #[serde(rename = "RatingValue")]
    pub rating_value: Option<String>,
    #[serde(rename = "RatingDate")]
    pub rating_date: Option<String>,
    #[serde(rename = "Hygiene")]
    pub hygiene: Option<String>,
    #[serde(rename = "Structural")]
    pub structural: Option<String>,
    #[serde(rename = "ConfidenceInManagement")]
    pub confidence_in_management: Option<String>,
    #[serde(rename = "Confidence")]
    pub confidence: Option<f64>,
}

impl MatchRow {
    /// `None` for an unmatched decision.
    pub fn from_decision(decision: &MatchDecision) -> Option<Self> {
        let c = decision.matched.as_ref()?;
        let owned = |s: Option<&str>| s.map(str::to_string);
        Some(Self {
            id: decision.record_id.clone(),
            fhrsid: c.fhrsid(),
            business_name: owned(c.business_name()),
            address_line_1: owned(c.address_line(1)),
            address_line_2: owned(c.address_line(2)),
            address_line_3: owned(c.address_line(3)),
            address_line_4: owned(c.address_line(4)),
            postcode: owned(c.postcode()),
            rating_value: c.rating_value(),
            rating_date: owned(c.rating_date()),
            hygiene: c.score(ScoreKind::Hygiene),
            structural: c.score(ScoreKind::Structural),
            confidence_in_management: c.score(ScoreKind::ConfidenceInManagement),
            confidence: decision.confidence.map(|pc| pc.value()),
        })
    }
}

#[derive(Serialize)]
struct UnmatchedRow<'a> {
    #[serde(rename = "id1")]
    id: &'a str,
}

/// Write one row per matched decision. Returns the number of rows written.
pub fn write_matches<'a, W: Write>(
    writer: W,
    decisions: impl IntoIterator<Item = &'a MatchDecision>,
) -> anyhow::Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut written = 0;
    for row in decisions.into_iter().filter_map(MatchRow::from_decision) {
        wtr.serialize(&row).with_context(|| format!("writing row for {}", row.id))?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

/// Write the IDs of unmatched decisions.
pub fn write_unmatched<'a, W: Write>(
    writer: W,
    decisions: impl IntoIterator<Item = &'a MatchDecision>,
) -> anyhow::Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut written = 0;
    for decision in decisions.into_iter().filter(|d| !d.is_match()) {
        wtr.serialize(UnmatchedRow {
            id: &decision.record_id,
        })?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}
